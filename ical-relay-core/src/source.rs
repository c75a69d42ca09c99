//! Calendar sources: `scheme://payload` descriptors and how to fetch them.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::calendar::Calendar;
use crate::error::{RelayError, RelayResult};
use crate::ics::{generate_calendar, parse_calendar_bytes};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Full `http://` or `https://` URL.
    Http(String),
    File(PathBuf),
    /// Standard base64 of the calendar bytes.
    Base64(String),
    /// Another profile's rendered calendar.
    Profile(String),
}

impl FromStr for Source {
    type Err = RelayError;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        let Some((scheme, payload)) = descriptor.split_once("://") else {
            return Err(RelayError::UnsupportedSource(descriptor.to_string()));
        };
        match scheme {
            "http" | "https" => Ok(Source::Http(descriptor.to_string())),
            "file" => Ok(Source::File(PathBuf::from(payload))),
            "base64" => Ok(Source::Base64(payload.to_string())),
            "profile" => Ok(Source::Profile(payload.to_string())),
            other => Err(RelayError::UnsupportedSource(other.to_string())),
        }
    }
}

impl Source {
    /// A `base64://` descriptor that carries `calendar` itself.
    pub fn inline_descriptor(calendar: &Calendar) -> String {
        format!("base64://{}", STANDARD.encode(generate_calendar(calendar)))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Http(url) => write!(f, "{url}"),
            Source::File(path) => write!(f, "file://{}", path.display()),
            Source::Base64(_) => write!(f, "base64://..."),
            Source::Profile(name) => write!(f, "profile://{name}"),
        }
    }
}

/// Loads calendars from every source kind except profiles.
#[derive(Debug, Clone)]
pub struct Fetcher {
    http: reqwest::Client,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> RelayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ical-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Fetcher { http })
    }

    pub async fn fetch(&self, source: &Source) -> RelayResult<Calendar> {
        match source {
            Source::Http(url) => self.fetch_http(url).await,
            Source::File(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| RelayError::Fetch {
                    source_url: source.to_string(),
                    reason: e.to_string(),
                })?;
                parse_calendar_bytes(&bytes)
            }
            Source::Base64(payload) => parse_calendar_bytes(&STANDARD.decode(payload.trim())?),
            Source::Profile(name) => Err(RelayError::Config(format!(
                "profile source '{name}' can only be rendered by a relay"
            ))),
        }
    }

    async fn fetch_http(&self, url: &str) -> RelayResult<Calendar> {
        tracing::debug!(url, "fetching calendar");
        let fetch_error = |e: reqwest::Error| RelayError::Fetch {
            source_url: url.to_string(),
            reason: e.to_string(),
        };

        let response = self.http.get(url).send().await.map_err(fetch_error)?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(RelayError::HttpStatus {
                source_url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await.map_err(fetch_error)?;
        parse_calendar_bytes(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ICS: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\nBEGIN:VEVENT\r\nUID:uid1\r\nSUMMARY:Team Sync\r\nDTSTART:20240110T100000Z\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

    fn fetcher() -> Fetcher {
        Fetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_parse_descriptors() {
        assert_eq!(
            "https://example.com/a.ics".parse::<Source>().unwrap(),
            Source::Http("https://example.com/a.ics".into())
        );
        assert_eq!(
            "file:///tmp/a.ics".parse::<Source>().unwrap(),
            Source::File(PathBuf::from("/tmp/a.ics"))
        );
        assert_eq!(
            "profile://team".parse::<Source>().unwrap(),
            Source::Profile("team".into())
        );
        assert!(matches!(
            "ftp://example.com/a.ics".parse::<Source>(),
            Err(RelayError::UnsupportedSource(scheme)) if scheme == "ftp"
        ));
        assert!("no scheme".parse::<Source>().is_err());
    }

    #[tokio::test]
    async fn test_inline_descriptor_carries_the_calendar() {
        let calendar = crate::ics::parse_calendar(ICS).unwrap();
        let descriptor = Source::inline_descriptor(&calendar);
        assert!(descriptor.starts_with("base64://"));

        let fetched = fetcher().fetch(&descriptor.parse().unwrap()).await.unwrap();
        let (_, event) = fetched.events().next().unwrap();
        assert_eq!(event.uid(), Some("uid1"));
        assert_eq!(event.summary().as_deref(), Some("Team Sync"));
    }

    #[tokio::test]
    async fn test_fetch_base64_and_file() {
        let encoded = STANDARD.encode(ICS);
        let calendar = fetcher().fetch(&Source::Base64(encoded)).await.unwrap();
        assert_eq!(calendar.event_count(), 1);

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.ics");
        std::fs::write(&file, ICS).unwrap();
        let calendar = fetcher().fetch(&Source::File(file)).await.unwrap();
        assert_eq!(calendar.event_count(), 1);

        let missing = Source::File(dir.path().join("missing.ics"));
        assert!(matches!(
            fetcher().fetch(&missing).await,
            Err(RelayError::Fetch { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_bad_base64() {
        assert!(matches!(
            fetcher().fetch(&Source::Base64("***".into())).await,
            Err(RelayError::Base64(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/team.ics"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ICS))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.ics"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let ok = Source::Http(format!("{}/team.ics", server.uri()));
        assert_eq!(fetcher().fetch(&ok).await.unwrap().event_count(), 1);

        let gone = Source::Http(format!("{}/gone.ics", server.uri()));
        assert!(matches!(
            fetcher().fetch(&gone).await,
            Err(RelayError::HttpStatus { status: 404, .. })
        ));
    }
}
