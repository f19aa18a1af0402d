//! The remote synthesis call.
//!
//! [`Synthesizer`] is the seam the driver depends on. [`SpeechKit`] is the
//! HTTP implementation: one form-encoded POST per chunk, a per-request
//! timeout, and retries for timeouts only. Any other failure, including a
//! non-success status, is returned immediately.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::settings::{AudioFormat, Emotion, Settings};

/// One synthesis call: SSML plus the voice to read it with.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest<'a> {
    pub ssml: &'a str,
    pub language: &'a str,
    pub voice: &'a str,
    pub emotion: Emotion,
    pub speed: f32,
    pub format: AudioFormat,
    pub sample_rate_hertz: Option<u32>,
}

impl SynthesisRequest<'_> {
    /// Form fields sent to the service.
    pub fn form_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("ssml", self.ssml.to_string()),
            ("lang", self.language.to_string()),
            ("voice", self.voice.to_string()),
            ("emotion", self.emotion.as_str().to_string()),
            ("speed", self.speed.to_string()),
            ("format", self.format.as_str().to_string()),
        ];
        if let Some(rate) = self.sample_rate_hertz {
            params.push(("sampleRateHertz", rate.to_string()));
        }
        params
    }
}

/// Turns SSML into audio bytes.
pub trait Synthesizer {
    fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Vec<u8>>;
}

/// How requests are authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    IamToken(String),
    ApiKey(String),
    Anonymous,
}

impl Credentials {
    fn header(&self) -> Option<String> {
        match self {
            Credentials::IamToken(token) => Some(format!("Bearer {token}")),
            Credentials::ApiKey(key) => Some(format!("Api-Key {key}")),
            Credentials::Anonymous => None,
        }
    }
}

/// Yandex SpeechKit v1 client.
#[derive(Debug, Clone)]
pub struct SpeechKit {
    client: Client,
    endpoint: String,
    credentials: Credentials,
    folder_id: Option<String>,
    retries: u32,
}

impl SpeechKit {
    pub fn new(
        endpoint: impl Into<String>,
        credentials: Credentials,
        folder_id: Option<String>,
        timeout: Duration,
        retries: u32,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("fb2speech/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            credentials,
            folder_id,
            retries,
        })
    }

    /// Build a client from settings. An IAM token takes precedence over an
    /// API key.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let credentials = match (&settings.iam_token, &settings.api_key) {
            (Some(token), _) => Credentials::IamToken(token.clone()),
            (None, Some(key)) => Credentials::ApiKey(key.clone()),
            (None, None) => Credentials::Anonymous,
        };
        Self::new(
            settings.endpoint.clone(),
            credentials,
            settings.folder_id.clone(),
            Duration::from_secs(settings.timeout),
            settings.retries,
        )
    }

    fn send(&self, params: &[(&'static str, String)]) -> Result<Vec<u8>> {
        let mut request = self.client.post(&self.endpoint).form(params);
        if let Some(header) = self.credentials.header() {
            request = request.header(AUTHORIZATION, header);
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("Unknown");
            let body = response.text().unwrap_or_default();
            return Err(Error::Synthesis {
                status: status.as_u16(),
                message: format!("{reason} {}", body.trim()),
                request: describe(params),
            });
        }

        Ok(response.bytes()?.to_vec())
    }
}

impl Synthesizer for SpeechKit {
    fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Vec<u8>> {
        let mut params = request.form_params();
        if let Some(folder_id) = &self.folder_id {
            params.push(("folderId", folder_id.clone()));
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.send(&params) {
                Err(Error::Http(e)) if e.is_timeout() => {
                    if attempts > self.retries {
                        return Err(Error::Timeout { attempts });
                    }
                    warn!("Synthesis timed out, retry {attempts} of {}", self.retries);
                }
                Ok(audio) => {
                    debug!("Received {} bytes", audio.len());
                    return Ok(audio);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn describe(params: &[(&'static str, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    fn request() -> SynthesisRequest<'static> {
        SynthesisRequest {
            ssml: "<speak>Hi</speak>",
            language: "ru-RU",
            voice: "oksana",
            emotion: Emotion::Good,
            speed: 1.2,
            format: AudioFormat::Oggopus,
            sample_rate_hertz: None,
        }
    }

    /// Answer successive connections with `responses`; `None` holds the
    /// connection open without answering.
    fn serve(responses: Vec<Option<&'static str>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/tts", listener.local_addr().unwrap());
        thread::spawn(move || {
            for response in responses {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                thread::spawn(move || answer(stream, response));
            }
        });
        url
    }

    fn answer(stream: TcpStream, response: Option<&str>) {
        let mut reader = BufReader::new(stream);
        let mut length = 0;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).is_err() {
                return;
            }
            if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                length = value.trim().parse().unwrap_or(0);
            }
            if line == "\r\n" || line.is_empty() {
                break;
            }
        }
        let mut body = vec![0; length];
        if reader.read_exact(&mut body).is_err() {
            return;
        }
        match response {
            Some(raw) => {
                let _ = reader.get_mut().write_all(raw.as_bytes());
            }
            None => thread::sleep(Duration::from_secs(2)),
        }
    }

    fn client(url: String, retries: u32) -> SpeechKit {
        SpeechKit::new(
            url,
            Credentials::IamToken("token".into()),
            Some("folder".into()),
            Duration::from_millis(500),
            retries,
        )
        .unwrap()
    }

    #[test]
    fn test_form_params() {
        let mut req = request();
        req.sample_rate_hertz = Some(48000);
        let params = req.form_params();
        assert!(params.contains(&("emotion", "good".to_string())));
        assert!(params.contains(&("speed", "1.2".to_string())));
        assert!(params.contains(&("lang", "ru-RU".to_string())));
        assert!(params.contains(&("sampleRateHertz", "48000".to_string())));
    }

    #[test]
    fn test_credentials_header() {
        assert_eq!(Credentials::IamToken("t".into()).header().as_deref(), Some("Bearer t"));
        assert_eq!(Credentials::ApiKey("k".into()).header().as_deref(), Some("Api-Key k"));
        assert_eq!(Credentials::Anonymous.header(), None);
    }

    #[test]
    fn test_from_settings_prefers_iam_token() {
        let settings = Settings {
            iam_token: Some("iam".into()),
            api_key: Some("key".into()),
            ..Settings::default()
        };
        let kit = SpeechKit::from_settings(&settings).unwrap();
        assert_eq!(kit.credentials, Credentials::IamToken("iam".into()));
    }

    #[test]
    fn test_success_returns_body() {
        let url = serve(vec![Some(
            "HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\nOggS",
        )]);
        let audio = client(url, 0).synthesize(&request()).unwrap();
        assert_eq!(audio, b"OggS");
    }

    #[test]
    fn test_error_status_is_not_retried() {
        let url = serve(vec![Some(
            "HTTP/1.1 401 Unauthorized\r\nContent-Length: 7\r\nConnection: close\r\n\r\ndenied!",
        )]);
        let err = client(url, 3).synthesize(&request()).unwrap_err();
        match err {
            Error::Synthesis { status, message, request } => {
                assert_eq!(status, 401);
                assert!(message.contains("denied!"));
                assert!(request.contains("voice=oksana"));
                assert!(request.contains("folderId=folder"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_timeouts_are_retried_then_fatal() {
        let url = serve(vec![None, None]);
        let err = client(url, 1).synthesize(&request()).unwrap_err();
        assert!(matches!(err, Error::Timeout { attempts: 2 }));
    }

    #[test]
    fn test_timeout_then_success() {
        let url = serve(vec![
            None,
            Some("HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok"),
        ]);
        let audio = client(url, 2).synthesize(&request()).unwrap();
        assert_eq!(audio, b"ok");
    }
}
