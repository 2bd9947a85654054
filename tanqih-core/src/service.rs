//! The cleaning service seam
//!
//! The engine never talks to a backend directly. Adapters implement
//! [`CleaningService`] and classify their own failures.

use crate::error::ServiceError;
use std::time::Duration;

/// One cleaning call
#[derive(Debug, Clone, Copy)]
pub struct CleanRequest<'a> {
    /// Raw chunk text
    pub text: &'a str,
    /// Upper bound for the whole call; adapters must enforce it
    pub timeout: Duration,
}

/// A remote (or local) text cleaner
pub trait CleaningService: Send + Sync {
    /// Clean one chunk of text
    fn clean(&self, request: &CleanRequest<'_>) -> Result<String, ServiceError>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

impl<S: CleaningService + ?Sized> CleaningService for Box<S> {
    fn clean(&self, request: &CleanRequest<'_>) -> Result<String, ServiceError> {
        (**self).clean(request)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Returns the input unchanged
///
/// Useful to rehearse chunking and resume without spending API quota.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoService;

impl CleaningService for EchoService {
    fn clean(&self, request: &CleanRequest<'_>) -> Result<String, ServiceError> {
        Ok(request.text.to_string())
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_returns_input() {
        let request = CleanRequest {
            text: "نص تجريبي",
            timeout: Duration::from_secs(1),
        };
        assert_eq!(EchoService.clean(&request).unwrap(), "نص تجريبي");
    }

    #[test]
    fn boxed_service_delegates() {
        let service: Box<dyn CleaningService> = Box::new(EchoService);
        assert_eq!(service.name(), "echo");
    }
}
