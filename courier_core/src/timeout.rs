use core::time::Duration;

/// Per-call timeout override.
///
/// - `Inherit`: keep the timeout resolved from method, interface and settings.
/// - `Clear`: no timeout for this call.
/// - `Set(d)`: force `d` for this call.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum TimeoutOverride {
    #[default]
    Inherit,
    Clear,
    Set(Duration),
}
