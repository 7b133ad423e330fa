//! Field-path resolution over record instances.

use tracing::warn;

use crate::core::fieldspec::segments;
use crate::core::record::{MemberKind, Record, Resolved};
use crate::core::value::Value;
use crate::error::ResolveError;

/// Walk `spec` from `record`, following links and invoking zero-argument
/// methods along the way.
///
/// Performs one member lookup per traversed segment. A null intermediate
/// short-circuits the walk and resolves to null.
pub fn resolve<R: Record>(record: &R, spec: &str) -> Result<Resolved<R>, ResolveError> {
    let mut current = Resolved::Record(record.clone());
    for (head, _) in segments(spec) {
        let target = match current {
            Resolved::Record(target) => target,
            Resolved::Value(Value::Null) => return Ok(Resolved::null()),
            Resolved::Value(value) => {
                return Err(ResolveError::NoSuchField {
                    record: format!("value {value:?}"),
                    attribute: head.to_string(),
                });
            }
            Resolved::Many(records) => {
                return Err(ResolveError::NoSuchField {
                    record: format!("a set of {} related records", records.len()),
                    attribute: head.to_string(),
                });
            }
        };
        current = lookup(&target, head)?;
    }
    Ok(current)
}

fn lookup<R: Record>(record: &R, name: &str) -> Result<Resolved<R>, ResolveError> {
    match record.member(name) {
        None => Err(ResolveError::NoSuchField {
            record: record.label(),
            attribute: name.to_string(),
        }),
        Some(MemberKind::Method { required_args }) if required_args > 0 => {
            Err(ResolveError::MethodRequiresArguments {
                record: record.label(),
                method: name.to_string(),
            })
        }
        Some(MemberKind::Method { .. }) => record.call(name),
        Some(MemberKind::Field | MemberKind::Constant) => record.get(name),
    }
}

/// Display text for one cell.
///
/// Record-not-found propagates. Any other failure is logged and rendered as
/// the empty string so a single bad cell does not abort a listing.
pub fn display_value<R: Record>(record: &R, spec: &str) -> Result<String, ResolveError> {
    match resolve(record, spec).and_then(|resolved| resolved.display()) {
        Ok(text) => Ok(text),
        Err(err) if err.is_lookup_failure() => Err(err),
        Err(err) => {
            warn!(record = %record.label(), spec, error = %err, "cell resolution failed");
            Ok(String::new())
        }
    }
}
