use tracing::{error, info, warn};

use super::client::{AiError, GenerateRequest, GenerativeClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub model: String,
    pub text: String,
}

/// Try each candidate model in order.
///
/// A missing model moves on to the next candidate; any other failure ends
/// the loop at once, even if a later model would have answered.
pub async fn generate_with_fallback(
    client: &dyn GenerativeClient,
    models: &[String],
    request: &GenerateRequest,
) -> Result<Generated, AiError> {
    if models.is_empty() {
        return Err(AiError::NoModels);
    }

    for model in models {
        match client.generate(model, request).await {
            Ok(text) => {
                info!(%model, "ai reply generated");
                return Ok(Generated { model: model.clone(), text });
            }
            Err(e) if e.is_model_not_found() => {
                warn!(%model, error = %e, "model unavailable, trying next candidate");
            }
            Err(e) => {
                error!(%model, error = %e, "ai request failed");
                return Err(e);
            }
        }
    }

    Err(AiError::Exhausted)
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedClient;
    use super::*;

    fn models(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn request() -> GenerateRequest {
        GenerateRequest { prompt: "hello".into(), image: None }
    }

    #[tokio::test]
    async fn falls_through_not_found_to_next_model() {
        let client =
            ScriptedClient::new(&[("m1", Err(404)), ("m2", Ok("from m2")), ("m3", Ok("from m3"))]);
        let out = generate_with_fallback(&client, &models(&["m1", "m2", "m3"]), &request())
            .await
            .unwrap();
        assert_eq!(out, Generated { model: "m2".into(), text: "from m2".into() });
        assert_eq!(client.calls(), vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn quota_error_stops_the_loop() {
        let client = ScriptedClient::new(&[("m1", Err(429)), ("m2", Ok("never"))]);
        let err = generate_with_fallback(&client, &models(&["m1", "m2"]), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Upstream { status: 429, .. }));
        assert_eq!(client.calls(), vec!["m1"]);
    }

    #[tokio::test]
    async fn all_missing_is_exhausted() {
        let client = ScriptedClient::new(&[]);
        let err = generate_with_fallback(&client, &models(&["a", "b"]), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Exhausted));
        assert_eq!(client.calls().len(), 2);
    }

    #[tokio::test]
    async fn empty_candidate_list_makes_no_call() {
        let client = ScriptedClient::new(&[("m1", Ok("x"))]);
        let err = generate_with_fallback(&client, &[], &request()).await.unwrap_err();
        assert!(matches!(err, AiError::NoModels));
        assert!(client.calls().is_empty());
    }
}
