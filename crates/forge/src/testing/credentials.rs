// Path: crates/forge/src/testing/credentials.rs

//! Validator credentials scraped from external tool output.

use casperlabs_types::config::ParsePolicy;
use casperlabs_types::error::PairError;

pub const PUBLIC_KEY_MARKER: &str = "CL_VALIDATOR_PUBLIC_KEY";
pub const PRIVATE_KEY_MARKER: &str = "CL_VALIDATOR_PRIVATE_KEY";
/// Text that ends an assignment when the tool redirects it into a node env file.
pub const DEFAULT_TERMINATOR: &str = " >> node-";

/// The validator keypair of a pair. Fixed once constructed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorCredentials {
    public_key: Option<String>,
    private_key: Option<String>,
}

impl ValidatorCredentials {
    pub fn new(public_key: Option<String>, private_key: Option<String>) -> Self {
        Self {
            public_key,
            private_key,
        }
    }

    pub fn public_key(&self) -> Option<&str> {
        self.public_key.as_deref()
    }

    pub fn private_key(&self) -> Option<&str> {
        self.private_key.as_deref()
    }
}

/// Extracts `KEY=value` assignments from line-oriented output.
#[derive(Debug, Clone)]
pub struct CredentialParser {
    policy: ParsePolicy,
    terminator: String,
}

impl CredentialParser {
    pub fn new(policy: ParsePolicy) -> Self {
        Self {
            policy,
            terminator: DEFAULT_TERMINATOR.to_string(),
        }
    }

    pub fn with_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.terminator = terminator.into();
        self
    }

    pub fn parse(&self, output: &str) -> Result<ValidatorCredentials, PairError> {
        Ok(ValidatorCredentials {
            public_key: self.field(output, PUBLIC_KEY_MARKER)?,
            private_key: self.field(output, PRIVATE_KEY_MARKER)?,
        })
    }

    fn field(&self, output: &str, key: &'static str) -> Result<Option<String>, PairError> {
        match extract_assignment(output, key, &self.terminator) {
            Some(value) if !value.is_empty() => Ok(Some(value.to_string())),
            found => match self.policy {
                ParsePolicy::Lenient => Ok(None),
                ParsePolicy::Strict => Err(PairError::CredentialParse {
                    key,
                    reason: if found.is_some() {
                        "assignment has an empty value".to_string()
                    } else {
                        "no assignment in output".to_string()
                    },
                }),
            },
        }
    }
}

/// Returns the value of the first `key=` assignment in `output`.
///
/// The value runs to `terminator` when it occurs on the same line, otherwise
/// to the end of the line. The marker must not be the tail of a longer
/// identifier (`XCL_VALIDATOR_PUBLIC_KEY=` does not match).
pub fn extract_assignment<'a>(output: &'a str, key: &str, terminator: &str) -> Option<&'a str> {
    let marker = format!("{}=", key);
    for line in output.lines() {
        let mut search_from = 0;
        while let Some(pos) = line.get(search_from..).and_then(|rest| rest.find(&marker)) {
            let start = search_from + pos;
            let bounded = line[..start]
                .chars()
                .next_back()
                .map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '_'));
            if bounded {
                let rest = &line[start + marker.len()..];
                let value = match rest.find(terminator) {
                    Some(end) if !terminator.is_empty() => &rest[..end],
                    _ => rest,
                };
                return Some(value.trim());
            }
            search_from = start + marker.len();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_value_up_to_terminator() {
        let out = "CL_VALIDATOR_PUBLIC_KEY=abc123 >> node-0/up-output";
        let creds = CredentialParser::new(ParsePolicy::Lenient).parse(out).unwrap();
        assert_eq!(creds.public_key(), Some("abc123"));
        assert_eq!(creds.private_key(), None);
    }

    #[test]
    fn missing_marker_leaves_field_unset() {
        let creds = CredentialParser::new(ParsePolicy::Lenient)
            .parse("docker run ... node-0\nStarted.\n")
            .unwrap();
        assert_eq!(creds, ValidatorCredentials::default());
        assert!(creds.public_key().is_none());
    }

    #[test]
    fn parses_both_keys_from_make_output() {
        let out = "\
mkdir -p .casperlabs/node-1
echo CL_VALIDATOR_PUBLIC_KEY=pubKEY1 >> node-1/.env
echo CL_VALIDATOR_PRIVATE_KEY=privKEY1= >> node-1/.env
docker-compose -p node-1 up -d
";
        let creds = CredentialParser::new(ParsePolicy::Strict).parse(out).unwrap();
        assert_eq!(creds.public_key(), Some("pubKEY1"));
        assert_eq!(creds.private_key(), Some("privKEY1="));
    }

    #[test]
    fn value_without_terminator_runs_to_end_of_line() {
        let out = "CL_VALIDATOR_PRIVATE_KEY=secret\nnext line";
        assert_eq!(
            extract_assignment(out, PRIVATE_KEY_MARKER, DEFAULT_TERMINATOR),
            Some("secret")
        );
    }

    #[test]
    fn marker_inside_longer_identifier_is_ignored() {
        let out = "XCL_VALIDATOR_PUBLIC_KEY=nope CL_VALIDATOR_PUBLIC_KEY=yes";
        assert_eq!(
            extract_assignment(out, PUBLIC_KEY_MARKER, DEFAULT_TERMINATOR),
            Some("yes")
        );
    }

    #[test]
    fn strict_policy_rejects_missing_and_empty() {
        let parser = CredentialParser::new(ParsePolicy::Strict);
        let err = parser.parse("CL_VALIDATOR_PRIVATE_KEY=x").unwrap_err();
        assert!(matches!(
            err,
            PairError::CredentialParse { key: PUBLIC_KEY_MARKER, .. }
        ));

        let err = parser
            .parse("CL_VALIDATOR_PUBLIC_KEY= >> node-0\nCL_VALIDATOR_PRIVATE_KEY=x")
            .unwrap_err();
        assert!(err.to_string().contains("empty value"));
    }

    #[test]
    fn lenient_policy_treats_empty_as_unset() {
        let creds = CredentialParser::new(ParsePolicy::Lenient)
            .parse("CL_VALIDATOR_PUBLIC_KEY= >> node-0")
            .unwrap();
        assert_eq!(creds.public_key(), None);
    }

    #[test]
    fn custom_terminator() {
        let creds = CredentialParser::new(ParsePolicy::Lenient)
            .with_terminator(";")
            .parse("CL_VALIDATOR_PUBLIC_KEY=k1; CL_VALIDATOR_PRIVATE_KEY=k2;")
            .unwrap();
        assert_eq!(creds.public_key(), Some("k1"));
        assert_eq!(creds.private_key(), Some("k2"));
    }
}
