mod dpermission;
mod dprincipal;
mod duuid;

pub use dpermission::DPermission;
pub use dprincipal::DPrincipalKind;
pub use duuid::DUuid;
