// Panic isolation for device workers and spawned runs
use std::any::Any;
use tokio::task::JoinError;

/// Render a panic payload as text
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Describe why a spawned task did not return
pub fn join_error_message(err: JoinError) -> String {
    if err.is_panic() {
        let payload = err.into_panic();
        format!("worker panicked: {}", panic_message(payload.as_ref()))
    } else {
        "worker cancelled".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panic_payload_is_extracted() {
        let err = tokio::spawn(async { panic!("driver blew up") })
            .await
            .unwrap_err();
        assert_eq!(join_error_message(err), "worker panicked: driver blew up");
    }

    #[tokio::test]
    async fn test_formatted_panic_payload() {
        let host = "sw1";
        let err = tokio::spawn(async move { panic!("bad host {}", host) })
            .await
            .unwrap_err();
        assert_eq!(join_error_message(err), "worker panicked: bad host sw1");
    }
}
