//! Replace-or-update decision for property changes

use tracing::debug;

use crate::arn;
use crate::validation::ResourceProperties;

/// Whether moving from `old` to `new` requires a new certificate
///
/// True when the primary domain, the effective region, the SAN set or the
/// zone id changed. Tag and CAA-flag changes are applied in place.
pub fn needs_replacement(stack_id: &str, old: &ResourceProperties, new: &ResourceProperties) -> bool {
    let domain_changed = old.domain_name != new.domain_name;
    let region_changed = !is_same_region(stack_id, old.region.as_deref(), new.region.as_deref());
    let sans_changed = old.san_set() != new.san_set();
    let zone_changed = old.hosted_zone_id != new.hosted_zone_id;

    let replace = domain_changed || region_changed || sans_changed || zone_changed;
    debug!(
        replace,
        domain_changed, region_changed, sans_changed, zone_changed, "Replacement decision"
    );
    replace
}

/// Region equivalence with the stack region as the implicit default
///
/// Equal values (both unset included) are the same region. When exactly one
/// side is unset, it stands for the region the stack lives in.
pub fn is_same_region(stack_id: &str, old: Option<&str>, new: Option<&str>) -> bool {
    match (old, new) {
        (a, b) if a == b => true,
        (Some(_), Some(_)) => false,
        (Some(explicit), None) | (None, Some(explicit)) => {
            arn::region(stack_id) == Some(explicit)
        }
        (None, None) => true,
    }
}
