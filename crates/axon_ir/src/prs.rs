//! Production rules: guarded pull-up/pull-down drives on Boolean nodes.

use crate::expr::Expr;
use serde::{Deserialize, Serialize};

/// The drive direction of a production rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleDir {
    /// When the guard holds, drive the node to 1.
    Up,
    /// When the guard holds, drive the node to 0.
    Down,
}

/// A single production rule `guard -> node±`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrsRule {
    /// Guard over local Boolean slots.
    pub guard: Expr,
    /// The driven local Boolean slot.
    pub target: usize,
    /// Pull direction.
    pub dir: RuleDir,
    /// Optional transition delay override in ticks.
    pub delay: Option<u64>,
}

/// A declared mutually-exclusive node group, checked when exclusive
/// monitoring is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclGroup {
    /// Local Boolean slots in the group.
    pub nodes: Vec<usize>,
    /// `true` for exclusive-high groups, `false` for exclusive-low.
    pub active_high: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_shape() {
        let rule = PrsRule {
            guard: Expr::Bool(0),
            target: 1,
            dir: RuleDir::Up,
            delay: Some(2),
        };
        assert_eq!(rule.target, 1);
        assert_eq!(rule.dir, RuleDir::Up);
    }

    #[test]
    fn excl_group_serde() {
        let group = ExclGroup {
            nodes: vec![0, 1],
            active_high: true,
        };
        let json = serde_json::to_string(&group).unwrap();
        let back: ExclGroup = serde_json::from_str(&json).unwrap();
        assert_eq!(back.nodes, vec![0, 1]);
        assert!(back.active_high);
    }
}
