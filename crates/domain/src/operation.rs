//! 算术表达式的校验与求值

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// 两个十进制数相加，例如 `1.5+2`
static OPERATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+(\.\d+)?\+\d+(\.\d+)?$").expect("operation pattern compiles")
});

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OperationError {
    #[error("表达式中存在空操作数: {0:?}")]
    EmptyTerm(String),

    #[error("无法解析的操作数: {0:?}")]
    InvalidNumber(String),

    #[error("计算结果溢出")]
    Overflow,
}

/// 是否满足 `number(.number)?+number(.number)?` 格式
pub fn is_valid_operation(operation: &str) -> bool {
    OPERATION_PATTERN.is_match(operation)
}

/// 按 `+` 切分并求和，支持多个操作数
pub fn evaluate_operation(operation: &str) -> Result<f64, OperationError> {
    let mut sum = 0.0_f64;
    for term in operation.split('+') {
        let term = term.trim();
        if term.is_empty() {
            return Err(OperationError::EmptyTerm(operation.to_string()));
        }
        let value: f64 = term
            .parse()
            .map_err(|_| OperationError::InvalidNumber(term.to_string()))?;
        if !value.is_finite() {
            return Err(OperationError::InvalidNumber(term.to_string()));
        }
        sum += value;
    }

    if !sum.is_finite() {
        return Err(OperationError::Overflow);
    }
    Ok(sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_operations() {
        for op in ["1+1", "5+10", "0.5+2", "12.25+0.75", "007+1"] {
            assert!(is_valid_operation(op), "{op} should be valid");
        }
    }

    #[test]
    fn test_invalid_operations() {
        for op in [
            "",
            "1",
            "1+",
            "+1",
            "1+2+3",
            "1-2",
            "1 + 2",
            "1.+2",
            ".5+2",
            "-1+2",
            "a+b",
            "invalid+operation",
            "1+2\n",
        ] {
            assert!(!is_valid_operation(op), "{op:?} should be invalid");
        }
    }

    #[test]
    fn test_evaluate_sums_terms() {
        assert_eq!(evaluate_operation("1+1"), Ok(2.0));
        assert_eq!(evaluate_operation("5+10"), Ok(15.0));
        assert_eq!(evaluate_operation("0.5+0.25"), Ok(0.75));
        assert_eq!(evaluate_operation("1+2+3"), Ok(6.0));
    }

    #[test]
    fn test_evaluate_rejects_garbage() {
        assert!(matches!(
            evaluate_operation("invalid+operation"),
            Err(OperationError::InvalidNumber(_))
        ));
        assert!(matches!(
            evaluate_operation("1++2"),
            Err(OperationError::EmptyTerm(_))
        ));
        assert!(matches!(
            evaluate_operation("inf+1"),
            Err(OperationError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_evaluate_detects_overflow() {
        let huge = format!("{}+{}", f64::MAX, f64::MAX);
        assert_eq!(evaluate_operation(&huge), Err(OperationError::Overflow));
    }
}
