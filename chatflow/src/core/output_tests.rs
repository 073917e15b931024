//! Tests for step values, outputs and result validation.

#[cfg(test)]
mod tests {
    use crate::core::{
        validate_output, ChatReply, ChatResult, ExecutionResult, OutputType, StepKind, StepOutput,
        StepValue,
    };
    use crate::errors::ErrorKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_step_output_ok() {
        let output = StepOutput::ok(StepValue::Code("x = 1".into()), "Code Generated Successfully")
            .with_metadata("code", json!("x = 1"));
        assert!(output.success);
        assert_eq!(output.value.as_code(), Some("x = 1"));
        assert_eq!(output.metadata.as_ref().map(|m| m.content_type.as_str()), Some("code"));
    }

    #[test]
    fn test_step_output_unsuccessful_is_not_an_error() {
        let output = StepOutput::unsuccessful(StepValue::Empty, "Output Validation Failed");
        assert!(!output.success);
        assert_eq!(output.to_dict()["message"], "Output Validation Failed");
    }

    #[test]
    fn test_into_code_rejects_other_variants() {
        let err = StepValue::Empty.into_code().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("expected a code value"));
    }

    #[test]
    fn test_output_type_parse() {
        assert_eq!("number".parse::<OutputType>().unwrap(), OutputType::Number);
        assert_eq!("dataframe".parse::<OutputType>().unwrap(), OutputType::Dataframe);
        assert!("chart".parse::<OutputType>().is_err());
    }

    #[test]
    fn test_validate_output_accepts_matching_number() {
        let result = ExecutionResult::new("number", json!(42.5));
        let (ok, logs) = validate_output(Some(OutputType::Number), &result);
        assert!(ok);
        assert!(logs.is_empty());
    }

    #[test]
    fn test_validate_output_rejects_wrong_tag() {
        let result = ExecutionResult::new("string", json!("42"));
        let (ok, logs) = validate_output(Some(OutputType::Number), &result);
        assert!(!ok);
        assert_eq!(logs.len(), 2);
    }

    #[test]
    fn test_validate_output_without_expectation_checks_shape_only() {
        let result = ExecutionResult::new("dataframe", json!({"columns": ["a"], "data": [[1]]}));
        assert!(validate_output(None, &result).0);

        let bad = ExecutionResult::new("number", json!("not a number"));
        assert!(!validate_output(None, &bad).0);
    }

    #[test]
    fn test_chat_reply_to_text() {
        let reply = ChatReply::Answer(ChatResult::new(
            ExecutionResult::new("string", json!("hello")),
            "result = {}",
        ));
        assert_eq!(reply.to_text(), "hello");
        assert_eq!(ChatReply::Code("x".into()).to_text(), "x");
        assert!(ChatReply::Error("bad".into()).is_error());
    }

    #[test]
    fn test_step_kind_names() {
        assert_eq!(StepKind::CacheLookup.to_string(), "CacheLookup");
        assert_eq!(StepKind::ErrorPromptGeneration.as_str(), "ErrorPromptGeneration");
    }
}
