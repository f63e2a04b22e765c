use serde::{Deserialize, Serialize};

use super::instruction::Ip;
use crate::lang::SymbolKind;

/// Branches whose target is not known yet.
///
/// A list is consumed by [`InstructionStream::patch`](super::InstructionStream::patch),
/// so it cannot be resolved twice. It is intentionally not `Clone`.
#[derive(Debug, Default, PartialEq, Eq)]
#[must_use = "an unpatched backpatch list leaves branches without a target"]
pub struct BackpatchList {
    ips: Vec<Ip>,
}

impl BackpatchList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(ip: Ip) -> Self {
        Self { ips: vec![ip] }
    }

    pub fn is_empty(&self) -> bool {
        self.ips.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ips.len()
    }

    pub fn ips(&self) -> &[Ip] {
        &self.ips
    }

    pub fn merge(mut self, mut other: BackpatchList) -> BackpatchList {
        self.ips.append(&mut other.ips);
        self
    }

    pub fn append(&mut self, other: BackpatchList) {
        self.ips.extend(other.ips);
    }

    pub(super) fn into_ips(self) -> Vec<Ip> {
        self.ips
    }
}

/// Concatenates two pending lists; either may be empty.
pub fn merge_lists(a: BackpatchList, b: BackpatchList) -> BackpatchList {
    a.merge(b)
}

/// One `case`/`default` arm collected while a switch body is generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// First instruction of the arm's body.
    pub source_ip: Ip,
    pub is_default: bool,
    pub value: Option<String>,
    pub kind: SymbolKind,
    pub line: u32,
}

/// Value-guarded list used for switch dispatch.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SwitchList {
    cases: Vec<SwitchCase>,
}

impl SwitchList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, case: SwitchCase) {
        self.cases.push(case);
    }

    pub fn merge(mut self, other: SwitchList) -> SwitchList {
        self.cases.extend(other.cases);
        self
    }

    pub fn default_case(&self) -> Option<&SwitchCase> {
        self.cases.iter().find(|c| c.is_default)
    }

    pub fn find_value(&self, value: &str) -> Option<&SwitchCase> {
        self.cases
            .iter()
            .find(|c| !c.is_default && c.value.as_deref() == Some(value))
    }

    pub fn valued(&self) -> impl Iterator<Item = &SwitchCase> {
        self.cases.iter().filter(|c| !c.is_default)
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_either_side_empty() {
        let a = merge_lists(BackpatchList::new(), BackpatchList::single(3));
        assert_eq!(a.ips(), &[3]);
        let b = merge_lists(BackpatchList::single(4), BackpatchList::new());
        assert_eq!(b.ips(), &[4]);
        assert!(merge_lists(BackpatchList::new(), BackpatchList::new()).is_empty());
    }

    #[test]
    fn test_merge_is_associative() {
        let left = merge_lists(
            merge_lists(BackpatchList::single(1), BackpatchList::single(2)),
            BackpatchList::single(3),
        );
        let right = merge_lists(
            BackpatchList::single(1),
            merge_lists(BackpatchList::single(2), BackpatchList::single(3)),
        );
        assert_eq!(left, right);
    }

    #[test]
    fn test_switch_list_lookup() {
        let mut list = SwitchList::new();
        list.push(SwitchCase {
            source_ip: 2,
            is_default: false,
            value: Some("1".to_string()),
            kind: SymbolKind::Uint8,
            line: 4,
        });
        list.push(SwitchCase {
            source_ip: 5,
            is_default: true,
            value: None,
            kind: SymbolKind::Unknown,
            line: 6,
        });

        assert_eq!(list.find_value("1").map(|c| c.source_ip), Some(2));
        assert!(list.find_value("2").is_none());
        assert_eq!(list.default_case().map(|c| c.line), Some(6));
        assert_eq!(list.valued().count(), 1);
    }
}
