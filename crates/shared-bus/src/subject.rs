//! # Subjects
//!
//! Subjects are dot-separated tokens. Subscriptions may use wildcards:
//! `*` matches exactly one token and `>` matches one or more trailing tokens.

use crate::error::BusError;

/// Validate a subject used for publishing (no wildcards allowed).
pub fn validate_publish_subject(subject: &str) -> Result<(), BusError> {
    validate(subject, false)
}

/// Validate a subject used for subscribing (wildcards allowed).
pub fn validate_subscribe_subject(subject: &str) -> Result<(), BusError> {
    validate(subject, true)
}

/// Validate a queue group name.
pub fn validate_queue_group(group: &str) -> Result<(), BusError> {
    if group.is_empty() || group.chars().any(char::is_whitespace) {
        return Err(BusError::InvalidQueueGroup(group.to_string()));
    }
    Ok(())
}

fn validate(subject: &str, allow_wildcards: bool) -> Result<(), BusError> {
    if subject.is_empty() {
        return Err(BusError::invalid_subject(subject, "empty subject"));
    }
    if subject.chars().any(char::is_whitespace) {
        return Err(BusError::invalid_subject(subject, "contains whitespace"));
    }

    let tokens: Vec<&str> = subject.split('.').collect();
    let last = tokens.len() - 1;
    for (i, token) in tokens.iter().enumerate() {
        if token.is_empty() {
            return Err(BusError::invalid_subject(subject, "empty token"));
        }
        let is_wildcard = *token == "*" || *token == ">";
        if is_wildcard && !allow_wildcards {
            return Err(BusError::invalid_subject(subject, "wildcards not allowed"));
        }
        if *token == ">" && i != last {
            return Err(BusError::invalid_subject(subject, "'>' must be the last token"));
        }
        if !is_wildcard && (token.contains('*') || token.contains('>')) {
            return Err(BusError::invalid_subject(subject, "wildcard inside token"));
        }
    }
    Ok(())
}

/// Whether a subscription `pattern` matches a concrete `subject`.
#[must_use]
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(matches("kube.get", "kube.get"));
        assert!(!matches("kube.get", "kube.list"));
        assert!(!matches("kube.get", "kube.get.extra"));
        assert!(!matches("kube.get.extra", "kube.get"));
    }

    #[test]
    fn test_single_token_wildcard() {
        assert!(matches("kube.*", "kube.get"));
        assert!(matches("kube.*.watch", "kube.event.watch"));
        assert!(!matches("kube.*", "kube.event.watch"));
    }

    #[test]
    fn test_full_wildcard() {
        assert!(matches("_INBOX.>", "_INBOX.abc"));
        assert!(matches("_INBOX.>", "_INBOX.abc.def"));
        assert!(!matches("_INBOX.>", "_INBOX"));
        assert!(matches(">", "kube.get"));
    }

    #[test]
    fn test_publish_subject_validation() {
        assert!(validate_publish_subject("kube.event.watch").is_ok());
        assert!(validate_publish_subject("").is_err());
        assert!(validate_publish_subject("kube..get").is_err());
        assert!(validate_publish_subject("kube.*").is_err());
        assert!(validate_publish_subject("kube get").is_err());
    }

    #[test]
    fn test_subscribe_subject_validation() {
        assert!(validate_subscribe_subject("kube.*").is_ok());
        assert!(validate_subscribe_subject("kube.>").is_ok());
        assert!(validate_subscribe_subject("kube.>.get").is_err());
        assert!(validate_subscribe_subject("kube.g*").is_err());
    }

    #[test]
    fn test_queue_group_validation() {
        assert!(validate_queue_group("kube-nats").is_ok());
        assert!(validate_queue_group("").is_err());
        assert!(validate_queue_group("kube nats").is_err());
    }
}
