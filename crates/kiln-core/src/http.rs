use crate::CoreError;

/// Status probe for remote artifacts, e.g. checking that a runtime version
/// exists before committing to a download.
pub struct HttpProbe {
    agent: ureq::Agent,
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProbe {
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    /// Issue a `HEAD` request and return the status code.
    ///
    /// Error statuses are results, not failures: a 404 comes back as
    /// `Ok(404)`. Only transport problems (DNS, refused connection, TLS) are
    /// errors.
    pub fn status(&self, url: &str) -> Result<u16, CoreError> {
        match self.agent.head(url).call() {
            Ok(resp) => Ok(resp.status().as_u16()),
            Err(ureq::Error::StatusCode(code)) => Ok(code),
            Err(e) => Err(CoreError::Http {
                url: url.to_owned(),
                reason: e.to_string(),
            }),
        }
    }
}
