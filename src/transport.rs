use std::time::Duration;

use crate::error::FailureDetail;

pub const HTTP_UNAUTHORIZED: u16 = 401;
pub const HTTP_NOT_FOUND: u16 = 404;
pub const HTTP_CONFLICT: u16 = 409;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}
impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub method: Method,
    pub url: &'a str,
    pub token: Option<&'a str>,
    pub body: Option<&'a str>,
}
impl<'a> Request<'a> {
    pub fn get(url: &'a str) -> Self {
        Self {
            method: Method::Get,
            url,
            token: None,
            body: None,
        }
    }
    pub fn post(url: &'a str, body: &'a str) -> Self {
        Self {
            method: Method::Post,
            url,
            token: None,
            body: Some(body),
        }
    }
    pub fn token(mut self, token: &'a str) -> Self {
        self.token = Some(token);
        self
    }
}

/// Result of one request, with the cases the send path branches on spelled out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    Failed(FailureDetail),
}
impl Outcome {
    pub fn from_status(code: u16, body: String) -> Self {
        match code {
            200..=299 => Self::Success(body),
            HTTP_UNAUTHORIZED => Self::Unauthorized(body),
            HTTP_NOT_FOUND => Self::NotFound(body),
            HTTP_CONFLICT => Self::Conflict(body),
            _ => Self::Failed(FailureDetail::Status { code, body }),
        }
    }

    pub fn into_failure(self) -> FailureDetail {
        match self {
            Self::Success(_) => FailureDetail::Status {
                code: 200,
                body: String::new(),
            },
            Self::Unauthorized(body) => FailureDetail::Status {
                code: HTTP_UNAUTHORIZED,
                body,
            },
            Self::NotFound(body) => FailureDetail::Status {
                code: HTTP_NOT_FOUND,
                body,
            },
            Self::Conflict(body) => FailureDetail::Status {
                code: HTTP_CONFLICT,
                body,
            },
            Self::Failed(detail) => detail,
        }
    }
}

pub trait Transport: core::fmt::Debug + Send + Sync {
    /// Blocking I/O
    fn execute(&self, request: Request<'_>) -> Outcome;
}

#[derive(Debug)]
pub struct HttpTransport {
    client: ureq::Agent,
}
impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { client }
    }
}
impl Transport for HttpTransport {
    fn execute(&self, request: Request<'_>) -> Outcome {
        let mut req = self
            .client
            .request(request.method.as_str(), request.url)
            .set("Accept", "application/json");
        if let Some(token) = request.token {
            req = req.set("X-Auth-Token", token);
        }
        let resp = match request.body {
            Some(body) => req
                .set("Content-Type", "application/json")
                .send_string(body),
            None => req.call(),
        };
        match resp {
            Ok(resp) => {
                let code = resp.status();
                match resp.into_string() {
                    Ok(body) => Outcome::from_status(code, body),
                    Err(e) => Outcome::Failed(FailureDetail::Transport(e.to_string())),
                }
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Outcome::from_status(code, body)
            }
            Err(ureq::Error::Transport(e)) => Outcome::Failed(FailureDetail::Transport(e.to_string())),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            Outcome::from_status(201, "{}".into()),
            Outcome::Success("{}".into())
        );
        assert_eq!(
            Outcome::from_status(401, "expired".into()),
            Outcome::Unauthorized("expired".into())
        );
        assert_eq!(
            Outcome::from_status(404, "gone".into()),
            Outcome::NotFound("gone".into())
        );
        assert_eq!(
            Outcome::from_status(409, String::new()),
            Outcome::Conflict(String::new())
        );
        assert_eq!(
            Outcome::from_status(503, "busy".into()),
            Outcome::Failed(FailureDetail::Status {
                code: 503,
                body: "busy".into()
            })
        );
    }

    #[test]
    fn test_not_found_as_failure() {
        assert_eq!(
            Outcome::NotFound(String::new()).into_failure().to_string(),
            "HTTP 404".to_string()
        );
    }

    #[test]
    fn test_failure_keeps_response_body() {
        assert_eq!(
            Outcome::from_status(409, "duplicate measures".into()).into_failure(),
            FailureDetail::Status {
                code: 409,
                body: "duplicate measures".into()
            }
        );
        assert_eq!(
            Outcome::from_status(404, "no such metric".into())
                .into_failure()
                .to_string(),
            "HTTP 404: no such metric".to_string()
        );
    }
}
