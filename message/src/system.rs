//! System (`S` frame) command strings and their replies.

/// Reply text marking a completed system command, matched case-sensitively
/// anywhere in the payload.
pub const SUCCESS: &[u8] = b"success";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SystemCommand {
    Info,
    SaveConfig,
    FactoryReset,
    Reboot,
}

impl SystemCommand {
    pub fn wire(self) -> &'static [u8] {
        match self {
            SystemCommand::Info => b"info",
            SystemCommand::SaveConfig => b"save-config",
            SystemCommand::FactoryReset => b"factory-reset",
            SystemCommand::Reboot => b"reboot",
        }
    }

    /// Whether this command elicits a system-response frame worth waiting
    /// for. `info` answers with an announcement instead and `reboot` never
    /// answers at all.
    pub fn expects_response(self) -> bool {
        matches!(self, SystemCommand::SaveConfig | SystemCommand::FactoryReset)
    }
}

pub fn is_success(reply: &[u8]) -> bool {
    reply.windows(SUCCESS.len()).any(|w| w == SUCCESS)
}
