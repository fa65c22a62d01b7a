use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use arith_core::{SchedulerError, SchedulerResult};
use arith_dispatcher::{BatchScheduler, PendingTaskReconciler};
use arith_domain::{
    CommitHook, DispatchQueue, FixedPriority, NewTask, ScheduleBatch, ScheduleBatchStore,
    SeededPriority, Task, TaskDispatch, TaskRepository, TaskSchedule,
};
use arith_infrastructure::{InMemoryDispatchQueue, MetricsCollector};
use arith_testing_utils::{TaskBuilder, TaskScheduleBuilder, TestDatabase};

fn scheduler(store: Arc<dyn ScheduleBatchStore>, queue: Arc<dyn DispatchQueue>) -> BatchScheduler {
    BatchScheduler::new(
        store,
        queue,
        Arc::new(FixedPriority(3)),
        Arc::new(MetricsCollector::new()),
    )
}

async fn remaining_runs(db: &TestDatabase, id: i64) -> u32 {
    db.manager
        .task_schedule_repository()
        .find_by_id(id)
        .await
        .unwrap()
        .unwrap()
        .schedule_x_times
}

#[tokio::test]
async fn test_due_daily_schedule_creates_one_task_and_decrements() {
    let db = TestDatabase::sqlite().await.unwrap();
    let now = Utc::now();
    let schedule = db
        .manager
        .task_schedule_repository()
        .create(
            &TaskScheduleBuilder::new()
                .daily(1)
                .times(3)
                .checked_at(now - Duration::days(2))
                .build(),
        )
        .await
        .unwrap();

    let queue = InMemoryDispatchQueue::new();
    let scheduler = scheduler(db.manager.schedule_batch_store(), Arc::new(queue.clone()));

    let report = scheduler.process_due_schedules_at(now).await.unwrap();
    assert_eq!(report.schedules_considered, 1);
    assert_eq!(report.tasks_created, 1);
    assert_eq!(remaining_runs(&db, schedule.task_schedule_id).await, 2);

    let tasks = db
        .manager
        .task_repository()
        .find_by_schedule(schedule.task_schedule_id)
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].priority, 3);
    assert_eq!(tasks[0].operation, "1+1");

    let queued = queue.snapshot();
    assert_eq!(queued, vec![TaskDispatch::new(tasks[0].task_id, 3)]);

    let stored = db
        .manager
        .task_schedule_repository()
        .find_by_id(schedule.task_schedule_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.checked_scheduling_at, now);
}

#[tokio::test]
async fn test_exhausted_schedule_is_never_selected() {
    let db = TestDatabase::sqlite().await.unwrap();
    let schedules = db.manager.task_schedule_repository();
    let exhausted = schedules
        .create(&TaskScheduleBuilder::new().times(0).build())
        .await
        .unwrap();
    let live = schedules
        .create(&TaskScheduleBuilder::new().times(1).build())
        .await
        .unwrap();

    let queue = InMemoryDispatchQueue::new();
    let scheduler = scheduler(db.manager.schedule_batch_store(), Arc::new(queue.clone()));
    let report = scheduler.process_due_schedules().await.unwrap();

    assert_eq!(report.schedules_considered, 1);
    assert_eq!(report.tasks_created, 1);
    assert_eq!(remaining_runs(&db, live.task_schedule_id).await, 0);
    assert!(db
        .manager
        .task_repository()
        .find_by_schedule(exhausted.task_schedule_id)
        .await
        .unwrap()
        .is_empty());

    // 全部耗尽后不再选中任何计划
    let report = scheduler.process_due_schedules().await.unwrap();
    assert_eq!(report.schedules_considered, 0);
    assert_eq!(report.tasks_created, 0);
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn test_second_run_without_time_passing_creates_nothing() {
    let db = TestDatabase::sqlite().await.unwrap();
    let schedule = db
        .manager
        .task_schedule_repository()
        .create(&TaskScheduleBuilder::new().every_x_hours(1).times(5).build())
        .await
        .unwrap();

    let queue = InMemoryDispatchQueue::new();
    let scheduler = scheduler(db.manager.schedule_batch_store(), Arc::new(queue.clone()));
    let now = Utc::now();

    let first = scheduler.process_due_schedules_at(now).await.unwrap();
    let second = scheduler.process_due_schedules_at(now).await.unwrap();

    assert_eq!(first.tasks_created, 1);
    assert_eq!(second.schedules_considered, 1);
    assert_eq!(second.tasks_created, 0);
    assert_eq!(remaining_runs(&db, schedule.task_schedule_id).await, 4);
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn test_hourly_cadence_boundary_is_inclusive() {
    let db = TestDatabase::sqlite().await.unwrap();
    let schedule = db
        .manager
        .task_schedule_repository()
        .create(&TaskScheduleBuilder::new().every_x_hours(2).times(3).build())
        .await
        .unwrap();

    let queue = InMemoryDispatchQueue::new();
    let scheduler = scheduler(db.manager.schedule_batch_store(), Arc::new(queue.clone()));
    let t0 = Utc::now();

    assert_eq!(scheduler.process_due_schedules_at(t0).await.unwrap().tasks_created, 1);

    let just_before = t0 + Duration::hours(2) - Duration::seconds(1);
    assert_eq!(
        scheduler
            .process_due_schedules_at(just_before)
            .await
            .unwrap()
            .tasks_created,
        0
    );

    let at_threshold = t0 + Duration::hours(2);
    assert_eq!(
        scheduler
            .process_due_schedules_at(at_threshold)
            .await
            .unwrap()
            .tasks_created,
        1
    );
    assert_eq!(remaining_runs(&db, schedule.task_schedule_id).await, 1);
}

#[tokio::test]
async fn test_unrepresentable_cadence_does_not_block_later_schedules() {
    let db = TestDatabase::sqlite().await.unwrap();
    let schedules = db.manager.task_schedule_repository();
    let now = Utc::now();

    let far = schedules
        .create(
            &TaskScheduleBuilder::new()
                .daily(u32::MAX)
                .times(2)
                .checked_at(now - Duration::days(3))
                .build(),
        )
        .await
        .unwrap();
    db.manager
        .task_repository()
        .create(
            &TaskBuilder::new()
                .for_schedule(far.task_schedule_id)
                .created_at(now - Duration::hours(1))
                .build(),
        )
        .await
        .unwrap();
    let daily = schedules
        .create(
            &TaskScheduleBuilder::new()
                .daily(1)
                .times(1)
                .checked_at(now - Duration::days(2))
                .build(),
        )
        .await
        .unwrap();

    let queue = InMemoryDispatchQueue::new();
    let scheduler = scheduler(db.manager.schedule_batch_store(), Arc::new(queue.clone()));
    let report = scheduler.process_due_schedules_at(now).await.unwrap();

    assert_eq!(report.schedules_considered, 2);
    assert_eq!(report.tasks_created, 1);
    assert_eq!(remaining_runs(&db, far.task_schedule_id).await, 2);
    assert_eq!(remaining_runs(&db, daily.task_schedule_id).await, 0);

    let stored = schedules.find_by_id(far.task_schedule_id).await.unwrap().unwrap();
    assert_eq!(stored.checked_scheduling_at, now);
}

#[tokio::test]
async fn test_schedule_priority_wins_over_resolver() {
    let db = TestDatabase::sqlite().await.unwrap();
    let schedules = db.manager.task_schedule_repository();
    let fixed = schedules
        .create(&TaskScheduleBuilder::new().with_priority(8).build())
        .await
        .unwrap();
    let random = schedules
        .create(&TaskScheduleBuilder::new().build())
        .await
        .unwrap();

    let scheduler = BatchScheduler::new(
        db.manager.schedule_batch_store(),
        Arc::new(InMemoryDispatchQueue::new()),
        Arc::new(SeededPriority::new(42)),
        Arc::new(MetricsCollector::new()),
    );
    scheduler.process_due_schedules().await.unwrap();

    let tasks = db.manager.task_repository();
    let fixed_task = &tasks.find_by_schedule(fixed.task_schedule_id).await.unwrap()[0];
    let random_task = &tasks.find_by_schedule(random.task_schedule_id).await.unwrap()[0];
    assert_eq!(fixed_task.priority, 8);
    assert!(random_task.priority <= 9);
}

#[tokio::test]
async fn test_batch_limit_processes_oldest_checked_first() {
    let db = TestDatabase::sqlite().await.unwrap();
    let schedules = db.manager.task_schedule_repository();
    let now = Utc::now();
    let newer = schedules
        .create(&TaskScheduleBuilder::new().checked_at(now - Duration::hours(1)).build())
        .await
        .unwrap();
    let older = schedules
        .create(&TaskScheduleBuilder::new().checked_at(now - Duration::hours(5)).build())
        .await
        .unwrap();

    let scheduler = scheduler(
        db.manager.schedule_batch_store(),
        Arc::new(InMemoryDispatchQueue::new()),
    )
    .with_batch_limit(1);

    let report = scheduler.process_due_schedules_at(now).await.unwrap();
    assert_eq!(report.schedules_considered, 1);
    assert_eq!(remaining_runs(&db, older.task_schedule_id).await, 0);
    assert_eq!(remaining_runs(&db, newer.task_schedule_id).await, 1);
}

/// 在第 `fail_at` 次插入任务时失败的存储
struct FailingStore {
    inner: Arc<dyn ScheduleBatchStore>,
    fail_at: usize,
}

struct FailingBatch {
    inner: Box<dyn ScheduleBatch>,
    inserts: usize,
    fail_at: usize,
}

#[async_trait]
impl ScheduleBatchStore for FailingStore {
    async fn begin(&self) -> SchedulerResult<Box<dyn ScheduleBatch>> {
        Ok(Box::new(FailingBatch {
            inner: self.inner.begin().await?,
            inserts: 0,
            fail_at: self.fail_at,
        }))
    }
}

#[async_trait]
impl ScheduleBatch for FailingBatch {
    async fn lock_due_schedules(&mut self, limit: i64) -> SchedulerResult<Vec<TaskSchedule>> {
        self.inner.lock_due_schedules(limit).await
    }

    async fn latest_task(&mut self, task_schedule_id: i64) -> SchedulerResult<Option<Task>> {
        self.inner.latest_task(task_schedule_id).await
    }

    async fn insert_task(&mut self, task: &NewTask) -> SchedulerResult<Task> {
        self.inserts += 1;
        if self.inserts == self.fail_at {
            return Err(SchedulerError::DatabaseOperation("injected failure".to_string()));
        }
        self.inner.insert_task(task).await
    }

    async fn consume_run(
        &mut self,
        task_schedule_id: i64,
        checked_at: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        self.inner.consume_run(task_schedule_id, checked_at).await
    }

    async fn touch(
        &mut self,
        task_schedule_id: i64,
        checked_at: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        self.inner.touch(task_schedule_id, checked_at).await
    }

    fn on_commit(&mut self, hook: CommitHook) {
        self.inner.on_commit(hook);
    }

    async fn commit(self: Box<Self>) -> SchedulerResult<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> SchedulerResult<()> {
        self.inner.rollback().await
    }
}

#[tokio::test]
async fn test_failure_mid_batch_rolls_back_every_schedule() {
    let db = TestDatabase::sqlite().await.unwrap();
    let schedules = db.manager.task_schedule_repository();
    let mut ids = Vec::new();
    for _ in 0..3 {
        let created = schedules
            .create(&TaskScheduleBuilder::new().times(2).build())
            .await
            .unwrap();
        ids.push(created.task_schedule_id);
    }
    let before: Vec<DateTime<Utc>> = {
        let mut stamps = Vec::new();
        for id in &ids {
            stamps.push(schedules.find_by_id(*id).await.unwrap().unwrap().checked_scheduling_at);
        }
        stamps
    };

    let queue = InMemoryDispatchQueue::new();
    let store = Arc::new(FailingStore {
        inner: db.manager.schedule_batch_store(),
        fail_at: 2,
    });
    let scheduler = scheduler(store, Arc::new(queue.clone()));

    let result = scheduler.process_due_schedules().await;
    assert!(result.is_err());
    assert!(queue.is_empty());

    let tasks = db.manager.task_repository();
    for (id, stamp) in ids.iter().zip(before) {
        let stored = schedules.find_by_id(*id).await.unwrap().unwrap();
        assert_eq!(stored.schedule_x_times, 2);
        assert_eq!(stored.checked_scheduling_at, stamp);
        assert!(tasks.find_by_schedule(*id).await.unwrap().is_empty());
    }

    // 下一次运行正常完成
    let scheduler = scheduler_with_queue(&db, queue.clone());
    let report = scheduler.process_due_schedules().await.unwrap();
    assert_eq!(report.tasks_created, 3);
    assert_eq!(queue.len(), 3);
}

fn scheduler_with_queue(db: &TestDatabase, queue: InMemoryDispatchQueue) -> BatchScheduler {
    scheduler(db.manager.schedule_batch_store(), Arc::new(queue))
}

/// 记录入队时任务行是否已经可见
struct VisibilityProbeQueue {
    tasks: Arc<dyn TaskRepository>,
    visible: Mutex<Vec<bool>>,
}

#[async_trait]
impl DispatchQueue for VisibilityProbeQueue {
    async fn enqueue(&self, dispatch: TaskDispatch) -> SchedulerResult<()> {
        let found = self.tasks.find_by_id(dispatch.task_id).await?.is_some();
        self.visible.lock().unwrap().push(found);
        Ok(())
    }
}

#[tokio::test]
async fn test_tasks_are_enqueued_only_after_commit() {
    let db = TestDatabase::sqlite().await.unwrap();
    let schedules = db.manager.task_schedule_repository();
    for _ in 0..2 {
        schedules
            .create(&TaskScheduleBuilder::new().build())
            .await
            .unwrap();
    }

    let probe = Arc::new(VisibilityProbeQueue {
        tasks: db.manager.task_repository(),
        visible: Mutex::new(Vec::new()),
    });
    let scheduler = scheduler(db.manager.schedule_batch_store(), probe.clone());
    scheduler.process_due_schedules().await.unwrap();

    assert_eq!(*probe.visible.lock().unwrap(), vec![true, true]);
}

struct BrokenQueue;

#[async_trait]
impl DispatchQueue for BrokenQueue {
    async fn enqueue(&self, _dispatch: TaskDispatch) -> SchedulerResult<()> {
        Err(SchedulerError::MessageQueue("broker unavailable".to_string()))
    }
}

#[tokio::test]
async fn test_reconciler_recovers_tasks_whose_enqueue_failed() {
    let db = TestDatabase::sqlite().await.unwrap();
    db.manager
        .task_schedule_repository()
        .create(&TaskScheduleBuilder::new().build())
        .await
        .unwrap();

    let scheduler = scheduler(db.manager.schedule_batch_store(), Arc::new(BrokenQueue));
    let report = scheduler.process_due_schedules().await.unwrap();
    assert_eq!(report.tasks_created, 1);

    let queue = InMemoryDispatchQueue::new();
    let reconciler = PendingTaskReconciler::new(
        db.manager.task_repository(),
        Arc::new(queue.clone()),
        Duration::minutes(5),
        100,
        Arc::new(MetricsCollector::new()),
    );

    // 宽限期内不补投
    assert_eq!(reconciler.reconcile().await.unwrap(), 0);

    let later = Utc::now() + Duration::minutes(6);
    assert_eq!(reconciler.reconcile_at(later).await.unwrap(), 1);
    assert_eq!(queue.snapshot()[0].task_id, report.dispatches[0].task_id);

    // 领取时已重新打上投递时间
    assert_eq!(reconciler.reconcile_at(later).await.unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_schedulers_never_double_create() {
    let db = TestDatabase::sqlite().await.unwrap();
    let schedules = db.manager.task_schedule_repository();
    let mut ids = Vec::new();
    for _ in 0..10 {
        let created = schedules
            .create(&TaskScheduleBuilder::new().times(1).build())
            .await
            .unwrap();
        ids.push(created.task_schedule_id);
    }

    let queue = InMemoryDispatchQueue::new();
    let a = scheduler_with_queue(&db, queue.clone()).with_batch_limit(6);
    let b = scheduler_with_queue(&db, queue.clone()).with_batch_limit(6);

    let (ra, rb) = tokio::join!(a.process_due_schedules(), b.process_due_schedules());
    let created = ra.unwrap().tasks_created + rb.unwrap().tasks_created;
    assert_eq!(created, 10);
    assert_eq!(queue.len(), 10);

    let tasks = db.manager.task_repository();
    for id in ids {
        assert_eq!(tasks.find_by_schedule(id).await.unwrap().len(), 1);
        assert_eq!(remaining_runs(&db, id).await, 0);
    }
}
