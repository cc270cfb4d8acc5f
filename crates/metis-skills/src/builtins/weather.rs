//! Weather lookup handler

use crate::error::{Error, Result};
use crate::handler::{schema_for, HandlerContext, SkillHandler};
use schemars::JsonSchema;
use serde::Deserialize;

/// Arguments accepted by the weather handler
#[derive(Debug, Deserialize, JsonSchema)]
pub struct WeatherArgs {
    /// Location to look up
    pub location: String,
}

/// Returns current conditions for a location.
///
/// Stub data until a real weather backend is wired in.
pub struct WeatherHandler;

#[async_trait::async_trait]
impl SkillHandler for WeatherHandler {
    async fn invoke(&self, args: &str, _ctx: &HandlerContext) -> Result<String> {
        let parsed: WeatherArgs = serde_json::from_str(args)
            .map_err(|e| Error::Execution(format!("invalid arguments: {e}")))?;

        Ok(serde_json::json!({
            "location": parsed.location,
            "temperature": "20",
            "weather": "sunny",
        })
        .to_string())
    }

    fn args_schema(&self) -> serde_json::Value {
        schema_for::<WeatherArgs>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::validate_args_schema;

    #[tokio::test]
    async fn test_invoke_returns_conditions() {
        let handler = WeatherHandler;
        let ctx = HandlerContext::new("get_weather");

        let out = handler
            .invoke(r#"{"location": "Tokyo"}"#, &ctx)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["location"], "Tokyo");
        assert_eq!(parsed["weather"], "sunny");
    }

    #[tokio::test]
    async fn test_invoke_rejects_bad_arguments() {
        let handler = WeatherHandler;
        let ctx = HandlerContext::new("get_weather");

        let err = handler.invoke(r#"{"city": "Tokyo"}"#, &ctx).await.unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
    }

    #[test]
    fn test_schema_declares_location() {
        let handler = WeatherHandler;
        let schema = handler.args_schema();
        validate_args_schema("get_weather", &schema).unwrap();
        assert!(schema["properties"]["location"].is_object());
    }
}
