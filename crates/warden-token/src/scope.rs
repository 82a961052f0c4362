// scope.rs — Scope grammar and matching.
//
// A scope is a `:`-separated path of segments, e.g. "email:send" or
// "payment:wire". A grant may end in a wildcard segment ("email:*"), which
// authorizes any action under that prefix. "*" alone authorizes everything.
//
// The wildcard is only legal as the final segment: "email:*:bulk" is
// malformed and rejected at issue time.

use crate::error::TokenError;

/// Validate a scope string at issue time.
///
/// Rules: at least one segment, no empty segments, no whitespace, and `*`
/// may only appear as the entire final segment.
pub fn validate_scope(scope: &str) -> Result<(), TokenError> {
    if scope.is_empty() {
        return Err(TokenError::InvalidScope {
            scope: scope.to_string(),
            reason: "empty scope".to_string(),
        });
    }

    let segments: Vec<&str> = scope.split(':').collect();
    let last = segments.len() - 1;

    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            return Err(TokenError::InvalidScope {
                scope: scope.to_string(),
                reason: "empty segment".to_string(),
            });
        }
        if segment.chars().any(char::is_whitespace) {
            return Err(TokenError::InvalidScope {
                scope: scope.to_string(),
                reason: "whitespace in segment".to_string(),
            });
        }
        if segment.contains('*') && (*segment != "*" || i != last) {
            return Err(TokenError::InvalidScope {
                scope: scope.to_string(),
                reason: "wildcard only allowed as the final segment".to_string(),
            });
        }
    }

    Ok(())
}

/// Check whether a granted scope authorizes a requested action name.
///
/// A grant authorizes an action if it is an exact match, or if it ends in a
/// wildcard segment whose prefix matches the action's leading segments
/// ("email:*" authorizes "email:send" and "email:send:bulk").
pub fn scope_authorizes(granted: &str, action: &str) -> bool {
    if granted == action {
        return true;
    }
    if granted == "*" {
        return true;
    }
    if let Some(prefix) = granted.strip_suffix(":*") {
        // The wildcard must consume at least one segment of the action.
        return action.strip_prefix(prefix).is_some_and(|rest| {
            rest.starts_with(':') && rest.len() > 1
        });
    }
    false
}
