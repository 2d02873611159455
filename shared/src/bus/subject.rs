// ============================================================================
// Subject Matching
// ============================================================================
//
// Subjects are '.'-separated tokens. In patterns `*` matches exactly one
// token and `>` (last token only) matches one or more trailing tokens.
// ============================================================================

use super::BusError;

/// Concrete publish subject: no empty tokens, no whitespace, no wildcards.
pub fn validate_subject(subject: &str) -> Result<(), BusError> {
    check_tokens(subject)?;
    if subject.split('.').any(|t| t == "*" || t == ">") {
        return Err(BusError::InvalidSubject(format!(
            "wildcards are not allowed in a publish subject: {:?}",
            subject
        )));
    }
    Ok(())
}

/// Subscription pattern: like a subject, plus `*` tokens and a trailing `>`.
pub fn validate_pattern(pattern: &str) -> Result<(), BusError> {
    check_tokens(pattern)?;
    let tokens: Vec<&str> = pattern.split('.').collect();
    if let Some(pos) = tokens.iter().position(|t| *t == ">") {
        if pos != tokens.len() - 1 {
            return Err(BusError::InvalidSubject(format!(
                "'>' must be the last token: {:?}",
                pattern
            )));
        }
    }
    Ok(())
}

fn check_tokens(subject: &str) -> Result<(), BusError> {
    if subject.is_empty() {
        return Err(BusError::InvalidSubject("empty subject".into()));
    }
    if subject.chars().any(char::is_whitespace) {
        return Err(BusError::InvalidSubject(format!(
            "whitespace in subject: {:?}",
            subject
        )));
    }
    if subject.split('.').any(str::is_empty) {
        return Err(BusError::InvalidSubject(format!(
            "empty token in subject: {:?}",
            subject
        )));
    }
    Ok(())
}

/// True when `subject` is matched by `pattern`.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut subject_tokens = subject.split('.');
    let mut pattern_tokens = pattern.split('.').peekable();

    while let Some(p) = pattern_tokens.next() {
        if p == ">" {
            return pattern_tokens.peek().is_none() && subject_tokens.next().is_some();
        }
        match subject_tokens.next() {
            Some(s) if p == "*" || p == s => continue,
            _ => return false,
        }
    }
    subject_tokens.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_match() {
        assert!(subject_matches("svc.echo", "svc.echo"));
        assert!(!subject_matches("svc.echo", "svc.echo.more"));
        assert!(!subject_matches("svc.echo.more", "svc.echo"));
        assert!(!subject_matches("svc.echo", "svc.other"));
    }

    #[test]
    fn test_single_token_wildcard() {
        assert!(subject_matches("*.echo", "svc.echo"));
        assert!(subject_matches("svc.*", "svc.echo"));
        assert!(!subject_matches("*.echo", "echo"));
        assert!(!subject_matches("*.echo", "a.b.echo"));
    }

    #[test]
    fn test_tail_wildcard() {
        assert!(subject_matches(">", "echo"));
        assert!(subject_matches(">", "a.b.c"));
        assert!(subject_matches("bridge.client.loc-7.>", "bridge.client.loc-7.resp.1"));
        assert!(!subject_matches("bridge.client.loc-7.>", "bridge.client.loc-7"));
        assert!(!subject_matches("bridge.client.loc-7.>", "bridge.client.loc-70.x"));
    }

    #[test]
    fn test_subject_validation() {
        assert!(validate_subject("svc.echo").is_ok());
        assert!(validate_subject("_INBOX.abc").is_ok());
        for bad in ["", "a..b", ".a", "a.", "a b", "a.*", ">"] {
            assert!(validate_subject(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_pattern_validation() {
        assert!(validate_pattern(">").is_ok());
        assert!(validate_pattern("a.*.c").is_ok());
        assert!(validate_pattern("a.>").is_ok());
        assert!(validate_pattern("a.>.c").is_err());
        assert!(validate_pattern("a..>").is_err());
    }
}
