//! Identifier allocation.
//!
//! Every entity owns a partitioned id range: all ids it mints carry the
//! entity's index as a prefix and a per-kind sequence as a suffix. Workers
//! therefore never share a counter, and ids do not depend on which worker
//! handled which entity.

use crate::types::EntityIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Event,
    Status,
    Address,
    Transaction,
    Label,
    Update,
}

impl IdKind {
    fn prefix(&self) -> &'static str {
        match self {
            Self::Event => "EVT",
            Self::Status => "STAT",
            Self::Address => "ADDR",
            Self::Transaction => "TXN",
            Self::Label => "LBL",
            Self::Update => "UPD",
        }
    }
}

/// The id range owned by one entity. Not shared across threads.
#[derive(Debug, Clone)]
pub struct IdBlock {
    entity_index: EntityIndex,
    counters: [u32; 6],
}

impl IdBlock {
    pub fn for_entity(entity_index: EntityIndex) -> Self {
        Self {
            entity_index,
            counters: [0; 6],
        }
    }

    pub fn next(&mut self, kind: IdKind) -> String {
        let slot = &mut self.counters[kind as usize];
        *slot += 1;
        format!("{}_{:06}_{:05}", kind.prefix(), self.entity_index + 1, *slot)
    }

    pub fn issued(&self, kind: IdKind) -> u32 {
        self.counters[kind as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotone_and_scoped() {
        let mut a = IdBlock::for_entity(0);
        let mut b = IdBlock::for_entity(1);
        assert_eq!(a.next(IdKind::Event), "EVT_000001_00001");
        assert_eq!(a.next(IdKind::Event), "EVT_000001_00002");
        assert_eq!(a.next(IdKind::Status), "STAT_000001_00001");
        assert_eq!(b.next(IdKind::Event), "EVT_000002_00001");
        assert_eq!(a.issued(IdKind::Event), 2);
    }
}
