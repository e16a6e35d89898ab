mod control_errors;
mod hook_errors;

pub use control_errors::ControlError;
pub use hook_errors::HookError;
