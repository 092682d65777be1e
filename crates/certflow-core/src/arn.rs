//! Helpers for resource references of the form
//! `arn:<partition>:<service>:<region>:<account>:<resource>`.
//!
//! Certificate references and stack identifiers both follow this shape; the
//! region embedded in them decides which regional endpoint to call and what
//! the implicit default region of a stack is.

/// Split a reference into its colon-separated fields, if it looks like an ARN
fn fields(reference: &str) -> Option<Vec<&str>> {
    let parts: Vec<&str> = reference.splitn(6, ':').collect();
    if parts.len() == 6 && parts[0] == "arn" && parts[1].starts_with("aws") {
        Some(parts)
    } else {
        None
    }
}

/// Region embedded in a reference, e.g. `eu-west-1`
///
/// Returns `None` for malformed references and for global resources whose
/// region field is empty.
pub fn region(reference: &str) -> Option<&str> {
    fields(reference)
        .map(|parts| parts[3])
        .filter(|region| !region.is_empty())
}

/// Whether the reference designates an ACM certificate
///
/// A failed create reports the physical id `"error"`; such ids must never be
/// handed to the certificate authority.
pub fn is_certificate_ref(reference: &str) -> bool {
    fields(reference)
        .is_some_and(|parts| parts[2] == "acm" && parts[5].starts_with("certificate/"))
}

/// Stack name and id from a stack reference
///
/// `arn:aws:cloudformation:eu-west-1:123:stack/app/0000-1111` yields
/// `app/0000-1111`. Anything that is not a stack ARN is returned unchanged.
pub fn stack_path(stack_id: &str) -> &str {
    fields(stack_id)
        .filter(|parts| parts[2] == "cloudformation")
        .and_then(|parts| parts[5].strip_prefix("stack/"))
        .unwrap_or(stack_id)
}
