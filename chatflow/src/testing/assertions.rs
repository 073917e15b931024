//! Assertions on replies and traces.

use crate::chat::ERROR_PREAMBLE;
use crate::core::{ChatReply, ChatResult};
use crate::tracker::ExecutionTracker;

/// Asserts that the reply is an answer and returns it.
pub fn assert_answer(reply: &ChatReply) -> &ChatResult {
    match reply {
        ChatReply::Answer(result) => result,
        other => panic!("Expected an answer, got: {other:?}"),
    }
}

/// Asserts that the reply is an error reply mentioning `fragment`.
pub fn assert_error_reply(reply: &ChatReply, fragment: &str) {
    match reply {
        ChatReply::Error(message) => {
            assert!(
                message.starts_with(ERROR_PREAMBLE),
                "Error reply lacks the preamble: {message}"
            );
            assert!(
                message.contains(fragment),
                "Expected error reply to mention '{fragment}', got: {message}"
            );
        }
        other => panic!("Expected an error reply, got: {other:?}"),
    }
}

/// Asserts that the tracker recorded `expected` steps in this order.
pub fn assert_step_sequence(tracker: &ExecutionTracker, expected: &[&str]) {
    let actual: Vec<String> = tracker.steps().into_iter().map(|s| s.step_type).collect();
    assert_eq!(actual, expected, "Unexpected step sequence");
}

/// Asserts that no tracked step has `name`.
pub fn assert_step_absent(tracker: &ExecutionTracker, name: &str) {
    let steps = tracker.steps();
    assert!(
        steps.iter().all(|s| s.step_type != name),
        "Expected no {name} step, got: {:?}",
        steps.iter().map(|s| &s.step_type).collect::<Vec<_>>()
    );
}

/// Asserts the trace was published `count` times and ended with `success`.
pub fn assert_published(tracker: &ExecutionTracker, count: usize, success: bool) {
    assert_eq!(tracker.publish_count(), count, "Unexpected publish count");
    assert_eq!(tracker.success(), success, "Unexpected run outcome");
}
