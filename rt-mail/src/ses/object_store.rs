//! S3 object retrieval.
//!
//! [`S3ObjectStore`] wraps the AWS SDK client, so credentials come from the
//! SDK's default provider chain (environment, profile, web identity, ECS and
//! instance metadata) and requests are signed by the SDK.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::config::{retry::RetryConfig, timeout::TimeoutConfig, Builder};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;
use tracing::{info, warn};

use crate::fetch::FetchError;

/// Reads whole objects, bounded in size.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch `bucket/key`. Objects larger than `max_bytes` fail with
    /// [`FetchError::TooLarge`]; partial data is never returned.
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        max_bytes: usize,
    ) -> Result<Vec<u8>, FetchError>;
}

/// [`ObjectStore`] backed by the AWS SDK S3 client.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build the S3 client from loaded AWS config.
    ///
    /// `endpoint` overrides the regional endpoint (MinIO, LocalStack) and
    /// switches to path-style addressing. The SDK does not retry: SNS
    /// redelivers a notification that failed.
    pub fn from_sdk_config(
        sdk_config: &SdkConfig,
        endpoint: Option<&str>,
        connect_timeout: Duration,
        operation_timeout: Duration,
    ) -> Self {
        let timeouts = TimeoutConfig::builder()
            .connect_timeout(connect_timeout)
            .operation_timeout(operation_timeout)
            .build();

        let mut builder = Builder::from(sdk_config)
            .retry_config(RetryConfig::disabled())
            .timeout_config(timeouts);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self::new(Client::from_conf(builder.build()))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        max_bytes: usize,
    ) -> Result<Vec<u8>, FetchError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let status = err.raw_response().map(|r| r.status().as_u16());
                warn!(
                    bucket = %bucket,
                    key = %key,
                    status_code = ?status,
                    error = %DisplayErrorContext(&err),
                    "s3_get_object_failed"
                );
                match status {
                    Some(status) => FetchError::Status(status),
                    None => FetchError::ObjectStore(DisplayErrorContext(&err).to_string()),
                }
            })?;

        let declared = output.content_length();
        if declared.is_some_and(|len| usize::try_from(len).map_or(true, |len| len > max_bytes)) {
            warn!(bucket = %bucket, key = %key, object_size = ?declared, "s3_object_too_large");
            return Err(FetchError::TooLarge { limit: max_bytes });
        }

        let mut stream = output.body;
        let mut body = Vec::new();
        while let Some(chunk) = stream
            .try_next()
            .await
            .map_err(|e| FetchError::ObjectStore(e.to_string()))?
        {
            if body.len() + chunk.len() > max_bytes {
                warn!(bucket = %bucket, key = %key, "s3_object_too_large");
                return Err(FetchError::TooLarge { limit: max_bytes });
            }
            body.extend_from_slice(&chunk);
        }

        info!(bucket = %bucket, key = %key, object_size = body.len(), "s3_get_object_complete");

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use aws_config::{BehaviorVersion, Region};
    use aws_sdk_s3::config::Credentials;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn store(endpoint: &str) -> S3ObjectStore {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("AKIDEXAMPLE", "SECRET", None, None, "test"))
            .load()
            .await;
        S3ObjectStore::from_sdk_config(
            &sdk_config,
            Some(endpoint),
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_get_object_signed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/inbound/emails/abc123"))
            .and(header_exists("x-amz-date"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Subject: hi\r\n\r\nbody"))
            .expect(1)
            .mount(&server)
            .await;

        let body = store(&server.uri())
            .await
            .get_object("inbound", "emails/abc123", 1024)
            .await
            .unwrap();

        assert_eq!(body, b"Subject: hi\r\n\r\nbody");

        let requests = server.received_requests().await.unwrap();
        let authorization = requests[0].headers.get("authorization").unwrap().to_str().unwrap();
        assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        assert!(authorization.contains("/us-east-1/s3/aws4_request"));
    }

    #[tokio::test]
    async fn test_get_object_keeps_8bit_bytes() {
        let raw: &[u8] = b"Subject: caf\xE9\r\n\r\ncaf\xE9\r\n";
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/inbound/emails/latin1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(raw))
            .mount(&server)
            .await;

        let body = store(&server.uri())
            .await
            .get_object("inbound", "emails/latin1", 1024)
            .await
            .unwrap();

        assert_eq!(body, raw);
    }

    #[tokio::test]
    async fn test_get_object_too_large() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 4096]))
            .mount(&server)
            .await;

        let err = store(&server.uri())
            .await
            .get_object("inbound", "big", 4095)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::TooLarge { limit: 4095 }));
    }

    #[tokio::test]
    async fn test_get_object_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404)
                    .insert_header("content-type", "application/xml")
                    .set_body_string("<Error><Code>NoSuchKey</Code></Error>"),
            )
            .mount(&server)
            .await;

        let err = store(&server.uri())
            .await
            .get_object("inbound", "missing", 1024)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status(404)));
    }

    #[tokio::test]
    async fn test_get_object_unreachable_endpoint() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = store(&endpoint)
            .await
            .get_object("inbound", "key", 1024)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::ObjectStore(_)));
    }

    /// Dot segments in a key name an object, not a path to normalise.
    #[tokio::test]
    async fn test_get_object_sends_dot_segments_verbatim() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed before headers");
                request.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\nConnection: close\r\n\r\nraw")
                .await
                .unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        let body = store(&endpoint)
            .await
            .get_object("inbound", "a/../b", 1024)
            .await
            .unwrap();
        let request = server.await.unwrap();

        assert_eq!(body, b"raw");
        let target = request.split_whitespace().nth(1).unwrap();
        assert_eq!(target.split('?').next().unwrap(), "/inbound/a/../b");
    }
}
