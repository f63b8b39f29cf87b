use crate::transport::WaitError;

/// Decides whether a failed wait for broker activity is a harmless wakeup.
///
/// A benign interruption (e.g. a signal delivered to the process while it was waiting) ends
/// the consume loop quietly; any other wait failure is surfaced as
/// [`ErrorKind::ConsumeFailed`](super::ErrorKind::ConsumeFailed).
///
/// Closures of the form `Fn(&WaitError) -> bool` are policies too.
pub trait InterruptionPolicy: Send + Sync {
    fn is_benign(&self, error: &WaitError) -> bool;
}

impl<F> InterruptionPolicy for F
where
    F: Fn(&WaitError) -> bool + Send + Sync,
{
    fn is_benign(&self, error: &WaitError) -> bool {
        (self)(error)
    }
}

/// The default [`InterruptionPolicy`].
///
/// A wait failure is benign if:
/// - it carries no detail at all;
/// - it is an I/O error of kind [`std::io::ErrorKind::Interrupted`];
/// - its detail contains one of the configured signatures (case-insensitive).
///
/// The default signature is `interrupted system call`, the message of `EINTR`.
#[derive(Debug, Clone)]
pub struct SignatureInterruptionPolicy {
    signatures: Vec<String>,
}

impl SignatureInterruptionPolicy {
    pub fn new<I, S>(signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            signatures: signatures
                .into_iter()
                .map(|s| s.into().to_lowercase())
                .collect(),
        }
    }
}

impl Default for SignatureInterruptionPolicy {
    fn default() -> Self {
        Self::new(["interrupted system call"])
    }
}

impl InterruptionPolicy for SignatureInterruptionPolicy {
    fn is_benign(&self, error: &WaitError) -> bool {
        if error.io_kind() == Some(std::io::ErrorKind::Interrupted) {
            return true;
        }
        match error.detail() {
            None => true,
            Some(detail) => {
                let detail = detail.to_lowercase();
                self.signatures
                    .iter()
                    .any(|signature| detail.contains(signature.as_str()))
            }
        }
    }
}
