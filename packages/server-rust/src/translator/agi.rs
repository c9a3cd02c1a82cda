//! Async AGI environment and result parsing.

use callwire_core::Headers;
use regex::Regex;
use url::form_urlencoded;

lazy_static::lazy_static! {
    static ref ENV_LINE: Regex = Regex::new(r"^([^:]+):(?:\s?(.+)|$)").unwrap();
    static ref RESULT: Regex =
        Regex::new(r"^(\d{3})(?:\s+result=(\S*))?(?:\s+\((.*)\))?").unwrap();
}

/// Errors raised while decoding async AGI payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgiParseError {
    #[error("invalid percent-encoding: {0}")]
    Encoding(String),
    #[error("malformed AGI line `{0}`")]
    MalformedLine(String),
    #[error("malformed AGI result `{0}`")]
    MalformedResult(String),
}

/// The channel environment sent with an `AsyncAGI` `Start` event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgiEnv {
    raw: Vec<(String, String)>,
}

impl AgiEnv {
    /// Parses the URL-encoded `Env` field.
    ///
    /// # Errors
    ///
    /// Returns [`AgiParseError`] on bad percent-encoding or a line that is not
    /// `key: value`.
    pub fn parse(env: &str) -> Result<Self, AgiParseError> {
        let decoded =
            urlencoding::decode(env).map_err(|err| AgiParseError::Encoding(err.to_string()))?;
        Self::from_lines(&decoded)
    }

    /// Parses already-decoded `key: value` lines. Stops at the first blank line.
    ///
    /// # Errors
    ///
    /// Returns [`AgiParseError::MalformedLine`] for a line without a key.
    pub fn from_lines(text: &str) -> Result<Self, AgiParseError> {
        let mut raw = Vec::new();
        for line in text.lines().map(str::trim_end) {
            if line.is_empty() {
                break;
            }
            let captures = ENV_LINE
                .captures(line)
                .ok_or_else(|| AgiParseError::MalformedLine(line.to_string()))?;
            let key = captures[1].to_string();
            let value = captures.get(2).map_or("", |m| m.as_str()).to_string();
            raw.push((key, value));
        }
        Ok(Self { raw })
    }

    /// Raw lookup by the original key, e.g. `agi_channel`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.raw
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn raw(&self) -> &[(String, String)] {
        &self.raw
    }

    /// Coerced variables: `agi_` prefix stripped and values trimmed, then
    /// overridden by the request's query parameters. `-` becomes `_` in
    /// `context` last, whichever source it came from.
    #[must_use]
    pub fn variables(&self) -> Vec<(String, String)> {
        let mut variables: Vec<(String, String)> = self
            .raw
            .iter()
            .map(|(key, value)| {
                let key = key.strip_prefix("agi_").unwrap_or(key);
                (key.to_string(), value.trim().to_string())
            })
            .collect();

        let query = self
            .get("agi_request")
            .and_then(|request| request.split_once('?'))
            .map(|(_, query)| query.to_string());
        if let Some(query) = query {
            for (key, value) in form_urlencoded::parse(query.as_bytes()) {
                match variables.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, existing)) => *existing = value.into_owned(),
                    None => variables.push((key.into_owned(), value.into_owned())),
                }
            }
        }

        for (key, value) in &mut variables {
            if key == "context" {
                *value = value.replace('-', "_");
            }
        }
        variables
    }

    /// Variable lookup on the coerced names.
    #[must_use]
    pub fn variable(&self, key: &str) -> Option<String> {
        self.variables()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        self.get("agi_channel")
    }

    /// Offer `to`: the dialed number, falling back to the extension.
    #[must_use]
    pub fn to(&self) -> String {
        self.variable("dnid")
            .filter(|dnid| !dnid.is_empty() && dnid != "unknown")
            .or_else(|| self.variable("extension"))
            .unwrap_or_default()
    }

    /// Offer `from`: the caller id.
    #[must_use]
    pub fn from(&self) -> String {
        self.variable("callerid").unwrap_or_default()
    }

    /// Offer headers built from the coerced variables.
    #[must_use]
    pub fn headers(&self) -> Headers {
        self.variables().into_iter().collect()
    }
}

/// The outcome of an AGI command as reported by `AsyncAGI` `Exec`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgiResult {
    pub code: u16,
    pub result: Option<String>,
    pub data: Option<String>,
}

impl AgiResult {
    /// Parses a URL-encoded result such as `200%20result=1%20(speech)%0A`.
    ///
    /// # Errors
    ///
    /// Returns [`AgiParseError`] if the text does not start with a status code.
    pub fn parse(result: &str) -> Result<Self, AgiParseError> {
        let decoded =
            urlencoding::decode(result).map_err(|err| AgiParseError::Encoding(err.to_string()))?;
        let line = decoded.trim();
        let captures = RESULT
            .captures(line)
            .ok_or_else(|| AgiParseError::MalformedResult(line.to_string()))?;
        let code = captures[1]
            .parse()
            .map_err(|_| AgiParseError::MalformedResult(line.to_string()))?;
        Ok(Self {
            code,
            result: captures.get(2).map(|m| m.as_str().to_string()),
            data: captures.get(3).map(|m| m.as_str().to_string()),
        })
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == 200
    }
}

/// Formats an AGI command line, quoting each argument.
#[must_use]
pub fn format_command(command: &str, arguments: &[&str]) -> String {
    let mut line = command.to_string();
    for argument in arguments {
        line.push_str(" \"");
        for c in argument.chars() {
            if c == '"' || c == '\\' {
                line.push('\\');
            }
            line.push(c);
        }
        line.push('"');
    }
    line
}
