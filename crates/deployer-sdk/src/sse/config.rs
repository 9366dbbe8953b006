use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ListenerConfigError {
    #[error("missing SSE endpoint URL")]
    MissingEndpoint,
    #[error("invalid SSE endpoint URL: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

#[derive(Clone, Debug)]
pub struct ListenerConfig {
    endpoint: Url,
    channel_capacity: usize,
}

impl ListenerConfig {
    pub fn builder() -> ListenerConfigBuilder {
        ListenerConfigBuilder::new()
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }
}

#[derive(Debug, Default)]
pub struct ListenerConfigBuilder {
    endpoint: Option<String>,
    channel_capacity: Option<usize>,
}

impl ListenerConfigBuilder {
    const DEFAULT_CHANNEL_CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = Some(capacity);
        self
    }

    pub fn build(self) -> Result<ListenerConfig, ListenerConfigError> {
        let endpoint = self
            .endpoint
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(ListenerConfigError::MissingEndpoint)?;

        Ok(ListenerConfig {
            endpoint: Url::parse(&endpoint)?,
            channel_capacity: self
                .channel_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(Self::DEFAULT_CHANNEL_CAPACITY),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_endpoint() {
        assert!(matches!(
            ListenerConfig::builder().build(),
            Err(ListenerConfigError::MissingEndpoint)
        ));
        assert!(matches!(
            ListenerConfig::builder().with_endpoint("   ").build(),
            Err(ListenerConfigError::MissingEndpoint)
        ));
    }

    #[test]
    fn test_build_rejects_invalid_endpoint() {
        assert!(matches!(
            ListenerConfig::builder().with_endpoint("::nope").build(),
            Err(ListenerConfigError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_build_defaults_capacity() {
        let config = ListenerConfig::builder()
            .with_endpoint(" http://127.0.0.1:9999/events/main ")
            .with_channel_capacity(0)
            .build()
            .expect("should build");
        assert_eq!(config.endpoint().as_str(), "http://127.0.0.1:9999/events/main");
        assert_eq!(config.channel_capacity(), 256);
    }
}
