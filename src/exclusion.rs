//! # Exclusion モジュール
//!
//! システム的なCANTCOを受けたアセットを、以後のペアリング候補から外します。
//! LOCALは当該トラックに対してのみ、GLOBALは全トラックに対して除外します。

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::messages::{AssignmentAckMessage, SystemicScope};
use crate::models::IdRecord;

/// 除外表
#[derive(Debug, Clone, Default)]
pub struct ExclusionArray {
    local: BTreeMap<IdRecord, BTreeSet<IdRecord>>,
    global: BTreeMap<IdRecord, bool>,
}

impl ExclusionArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// ACKから除外を登録
    ///
    /// 範囲付きのCANTCOでなければ何もせず `false` を返します。
    pub fn add_exclusion(&mut self, ack: &AssignmentAckMessage) -> bool {
        let Some(scope) = ack.systemic_scope() else {
            return false;
        };
        let asset = ack.assigned_unit();
        match scope {
            SystemicScope::Local => {
                self.local.entry(ack.reference_track).or_default().insert(asset);
                info!(asset = %asset, track = %ack.reference_track, "アセットを当該トラックから除外");
            }
            SystemicScope::Global => {
                self.global.insert(asset, true);
                info!(asset = %asset, "アセットを全トラックから除外");
            }
        }
        true
    }

    pub fn is_globally_excluded(&self, asset: &IdRecord) -> bool {
        self.global.get(asset).copied().unwrap_or(false)
    }

    pub fn is_locally_excluded(&self, track: &IdRecord, asset: &IdRecord) -> bool {
        self.local.get(track).is_some_and(|assets| assets.contains(asset))
    }

    pub fn is_asset_excluded(&self, track: &IdRecord, asset: &IdRecord) -> bool {
        self.is_globally_excluded(asset) || self.is_locally_excluded(track, asset)
    }

    /// 消失したトラックのLOCAL除外を破棄
    pub fn remove_track(&mut self, track: &IdRecord) {
        self.local.remove(track);
    }

    pub fn clear(&mut self) {
        self.local.clear();
        self.global.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.global.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{AssignmentMessage, ShotDoctrine};
    use crate::models::WeaponRef;

    fn ack(track: i32, asset: i32) -> AssignmentAckMessage {
        let weapon = WeaponRef { asset: IdRecord::new(asset, 0), weapon: IdRecord::new(asset, 1) };
        let assignment = AssignmentMessage::new(IdRecord::new(1, 0), 0.0, IdRecord::new(track, 0), weapon, ShotDoctrine::Shoot1);
        AssignmentAckMessage::for_assignment(&assignment, weapon.asset, 1.0)
    }

    #[test]
    fn test_local_scope_only_excludes_that_track() {
        let mut exclusions = ExclusionArray::new();
        let mut cantco = ack(900, 20);
        cantco.set_cantco("masked", Some(SystemicScope::Local), 2.0).unwrap();
        assert!(exclusions.add_exclusion(&cantco));

        let asset = IdRecord::new(20, 0);
        assert!(exclusions.is_asset_excluded(&IdRecord::new(900, 0), &asset));
        assert!(!exclusions.is_asset_excluded(&IdRecord::new(901, 0), &asset));
        assert!(!exclusions.is_globally_excluded(&asset));

        exclusions.remove_track(&IdRecord::new(900, 0));
        assert!(exclusions.is_empty());
    }

    #[test]
    fn test_global_scope_excludes_every_track() {
        let mut exclusions = ExclusionArray::new();
        let mut cantco = ack(900, 20);
        cantco.set_cantco("radar down", Some(SystemicScope::Global), 2.0).unwrap();
        exclusions.add_exclusion(&cantco);

        let asset = IdRecord::new(20, 0);
        for track in [900, 901, 5000] {
            assert!(exclusions.is_asset_excluded(&IdRecord::new(track, 0), &asset));
        }
        assert!(!exclusions.is_asset_excluded(&IdRecord::new(900, 0), &IdRecord::new(21, 0)));
    }

    #[test]
    fn test_non_systemic_ack_is_ignored() {
        let mut exclusions = ExclusionArray::new();
        let mut plain = ack(900, 20);
        plain.set_cantco("busy", None, 2.0).unwrap();
        assert!(!exclusions.add_exclusion(&plain));

        let mut wilco = ack(900, 20);
        wilco.set_status(crate::messages::AssignmentStatus::Wilco, 2.0).unwrap();
        assert!(!exclusions.add_exclusion(&wilco));
        assert!(exclusions.is_empty());
    }
}
