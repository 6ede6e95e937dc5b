//! Assistant lifecycle commands
//!
//! These replies are directives, not speech; the control plane acts on them.

use super::Handler;
use crate::Result;
use crate::directive::Directive;
use crate::intent::Params;

/// Stop, restart, mute and unmute the assistant
pub struct SystemControl;

impl Handler for SystemControl {
    fn handle(&self, params: &Params) -> Result<String> {
        let action = params.action();
        let directive = match action.as_str() {
            "stop" | "shutdown" | "exit" => Directive::Shutdown,
            "restart" => Directive::Restart,
            "mute" | "mute_on" => Directive::Mute,
            "unmute" | "mute_off" => Directive::Unmute,
            _ => return Ok(format!("Unknown system command: {action}")),
        };
        Ok(directive.sentinel())
    }
}
