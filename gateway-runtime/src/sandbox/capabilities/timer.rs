use std::time::Duration;

use rhai::{Dynamic, FnPtr, INT, Module, NativeCallContext};

use super::terminated;
use crate::sandbox::{Budget, RhaiResultOf};

/// Block for `ms`, or for the rest of the budget and then terminate.
fn wait(budget: Budget, ms: INT) -> RhaiResultOf<()> {
    let requested = Duration::from_millis(u64::try_from(ms).unwrap_or(0));
    let remaining = budget.remaining();
    if requested > remaining {
        std::thread::sleep(remaining);
        return Err(terminated());
    }
    std::thread::sleep(requested);
    Ok(())
}

/// `timer::sleep(ms)` and `timer::set_timeout(callback, ms)`. The callback
/// runs after the delay and its value is returned.
pub(super) fn module(budget: Budget) -> Module {
    let mut module = Module::new();

    module.set_native_fn("sleep", move |ms: INT| wait(budget, ms));
    module.set_native_fn(
        "set_timeout",
        move |ctx: NativeCallContext, callback: FnPtr, ms: INT| -> RhaiResultOf<Dynamic> {
            wait(budget, ms)?;
            callback.call_within_context(&ctx, ())
        },
    );

    module
}
