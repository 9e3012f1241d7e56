//! Classify operation failures as transient or permanent.

use super::error::OperationError;
use super::policy::ErrorKind;

/// One configured retryable signature.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Signature {
    /// Lower-cased fragment matched against the message text.
    Text(String),
    /// Numeric signature: matches the status field or the message text.
    Code { code: u32, text: String },
}

/// Matches failures against the configured retryable signatures.
///
/// A signature matches when it occurs (case-insensitively) in the error
/// message, or when it is numeric and equals the error's status code.
/// Anything that matches nothing is permanent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorClassifier {
    signatures: Vec<Signature>,
}

impl ErrorClassifier {
    pub fn new<I, S>(signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let signatures = signatures
            .into_iter()
            .filter_map(|s| {
                let text = s.as_ref().trim().to_lowercase();
                if text.is_empty() {
                    return None;
                }
                Some(match text.parse::<u32>() {
                    Ok(code) => Signature::Code { code, text },
                    Err(_) => Signature::Text(text),
                })
            })
            .collect();
        Self { signatures }
    }

    pub fn classify(&self, e: &OperationError) -> ErrorKind {
        let message = e.message().to_lowercase();
        let matched = self.signatures.iter().any(|sig| match sig {
            Signature::Text(text) => message.contains(text.as_str()),
            Signature::Code { code, text } => {
                e.status() == Some(*code) || message.contains(text.as_str())
            }
        });
        if matched {
            ErrorKind::Transient
        } else {
            ErrorKind::Permanent
        }
    }
}
