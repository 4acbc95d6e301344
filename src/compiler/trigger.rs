//! Script kinds and the call syntax they allow.

use std::fmt;

use serde::Serialize;

use super::token::TokenKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TriggerType {
    /// Callable subroutine: `~name(args)`, may return values.
    Proc,
    /// Tail jump target: `@name(args)`, never returns.
    Label,
    /// Entry point invoked by the host only.
    ClientScript,
}

impl TriggerType {
    pub const ALL: [TriggerType; 3] = [TriggerType::Proc, TriggerType::Label, TriggerType::ClientScript];

    pub fn representation(self) -> &'static str {
        match self {
            Self::Proc => "proc",
            Self::Label => "label",
            Self::ClientScript => "clientscript",
        }
    }

    pub fn for_representation(text: &str) -> Option<TriggerType> {
        Self::ALL.into_iter().find(|t| t.representation() == text)
    }

    /// Sigil token that invokes scripts of this trigger from source.
    pub fn operator(self) -> Option<TokenKind> {
        match self {
            Self::Proc => Some(TokenKind::Tilde),
            Self::Label => Some(TokenKind::At),
            Self::ClientScript => None,
        }
    }

    pub fn for_operator(kind: TokenKind) -> Option<TriggerType> {
        Self::ALL.into_iter().find(|t| t.operator() == Some(kind))
    }

    pub fn has_arguments(self) -> bool {
        match self {
            Self::Proc | Self::Label | Self::ClientScript => true,
        }
    }

    pub fn has_returns(self) -> bool {
        matches!(self, Self::Proc)
    }

    pub fn is_invokable(self) -> bool {
        self.operator().is_some()
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.representation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_and_operator() {
        assert_eq!(TriggerType::for_representation("proc"), Some(TriggerType::Proc));
        assert_eq!(TriggerType::for_representation("timer"), None);
        assert_eq!(TriggerType::for_operator(TokenKind::At), Some(TriggerType::Label));
        assert_eq!(TriggerType::for_operator(TokenKind::Dollar), None);
    }

    #[test]
    fn properties() {
        assert!(TriggerType::Proc.has_returns());
        assert!(!TriggerType::Label.has_returns());
        assert!(!TriggerType::ClientScript.is_invokable());
    }
}
