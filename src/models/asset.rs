use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{IadsError, Result};
use crate::models::common::{IdRecord, PositionRecord, Vector3};
use crate::models::weapon::{WeaponRecord, WeaponRef};

/// アセットの稼働状態（White: 未報告、Red: 交戦不能）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    White,
    #[default]
    Green,
    Yellow,
    Red,
}

/// アセット（射撃単位）レコード
///
/// アセットが武器を所有し、武器からは `parent` IDで逆参照するだけです。
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRecord {
    pub id: IdRecord,
    pub name: String,
    pub position: PositionRecord,
    pub velocity: Vector3,
    /// 最終状況報告時刻（秒）
    pub status_time: f64,
    pub max_assignments: u32,
    /// 割り当て受領から実行開始までの遅延（秒）
    pub assignment_delay_s: f64,
    /// 交戦実行の想定遅延（秒）
    pub execution_delay_s: f64,
    pub system_status: SystemStatus,
    /// キュー指令を受ける追尾センサー
    pub cue_sensor: Option<IdRecord>,
    assignments_in_progress: u32,
    weapons: Vec<WeaponRecord>,
}

impl AssetRecord {
    pub fn new(id: IdRecord, name: impl Into<String>, position: PositionRecord) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            velocity: Vector3::ZERO,
            status_time: 0.0,
            max_assignments: u32::MAX,
            assignment_delay_s: 0.0,
            execution_delay_s: 0.0,
            system_status: SystemStatus::Green,
            cue_sensor: None,
            assignments_in_progress: 0,
            weapons: Vec::new(),
        }
    }

    /// 武器を登録（親IDはこのアセットに付け替える）
    pub fn add_weapon(&mut self, mut weapon: WeaponRecord) {
        weapon.parent = self.id;
        self.weapons.push(weapon);
    }

    pub fn weapons(&self) -> &[WeaponRecord] {
        &self.weapons
    }

    pub fn weapon(&self, id: IdRecord) -> Option<&WeaponRecord> {
        self.weapons.iter().find(|w| w.id == id)
    }

    pub fn weapon_mut(&mut self, id: IdRecord) -> Option<&mut WeaponRecord> {
        self.weapons.iter_mut().find(|w| w.id == id)
    }

    pub fn assignments_in_progress(&self) -> u32 {
        self.assignments_in_progress
    }

    pub fn open_assignments(&self) -> u32 {
        self.max_assignments.saturating_sub(self.assignments_in_progress)
    }

    pub fn increment_assignments(&mut self) {
        if self.assignments_in_progress < self.max_assignments {
            self.assignments_in_progress += 1;
        } else {
            warn!(asset = %self.id, "割り当て数が上限に達しています");
        }
    }

    pub fn decrement_assignments(&mut self) {
        if self.assignments_in_progress > 0 {
            self.assignments_in_progress -= 1;
        } else {
            warn!(asset = %self.id, "割り当て数が既に0です");
        }
    }

    /// 状況報告による割り当て数の上書き（上限で丸め込み）
    pub fn set_reported_assignments(&mut self, in_progress: u32) {
        self.assignments_in_progress = in_progress.min(self.max_assignments);
    }

    pub fn is_operational(&self) -> bool {
        self.system_status != SystemStatus::Red
    }

    /// 状況報告の経過時間が `stale_time` を超えているか
    pub fn is_status_stale(&self, sim_time: f64, stale_time: f64) -> bool {
        sim_time - self.status_time > stale_time
    }
}

/// アセット登録簿
#[derive(Debug, Clone, Default)]
pub struct AssetMap {
    assets: BTreeMap<IdRecord, AssetRecord>,
}

impl AssetMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, asset: AssetRecord) {
        self.assets.insert(asset.id, asset);
    }

    pub fn get(&self, id: IdRecord) -> Option<&AssetRecord> {
        self.assets.get(&id)
    }

    pub fn get_mut(&mut self, id: IdRecord) -> Option<&mut AssetRecord> {
        self.assets.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetRecord> {
        self.assets.values()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// 全武器を (アセットID, 武器ID) 順で列挙
    pub fn weapons(&self) -> impl Iterator<Item = &WeaponRecord> {
        self.assets.values().flat_map(|a| a.weapons.iter())
    }

    pub fn weapon(&self, weapon: WeaponRef) -> Option<&WeaponRecord> {
        self.get(weapon.asset).and_then(|a| a.weapon(weapon.weapon))
    }

    pub fn weapon_mut(&mut self, weapon: WeaponRef) -> Option<&mut WeaponRecord> {
        self.get_mut(weapon.asset).and_then(|a| a.weapon_mut(weapon.weapon))
    }

    /// 割り当て確定：武器の推定資源とアセットの割り当て数を増やす
    ///
    /// 余力がない場合は何も変更せず `NoCapacity` を返します。
    pub fn commit_assignment(&mut self, weapon: WeaponRef, shots: u32) -> Result<()> {
        let asset = self.assets.get_mut(&weapon.asset).ok_or(IadsError::UnknownAsset(weapon.asset))?;
        let open = asset.open_assignments();
        let record = asset
            .weapon_mut(weapon.weapon)
            .ok_or(IadsError::UnknownWeapon { asset: weapon.asset, weapon: weapon.weapon })?;
        if open == 0 || record.assignment_capacity(shots) == 0 {
            return Err(IadsError::NoCapacity { asset: weapon.asset, weapon: weapon.weapon });
        }
        record.increment_estimations(shots);
        asset.increment_assignments();
        Ok(())
    }

    /// 割り当て先の武器を付け替える
    ///
    /// 新しい武器へ確定できなければ元の武器の確保を戻してエラーを返します。
    pub fn reassign(&mut self, from: WeaponRef, to: WeaponRef, shots: u32) -> Result<()> {
        if self.weapon(to).is_none() {
            return Err(IadsError::UnknownWeapon { asset: to.asset, weapon: to.weapon });
        }
        self.release_assignment(from, shots)?;
        if let Err(e) = self.commit_assignment(to, shots) {
            self.commit_assignment(from, shots)?;
            return Err(e);
        }
        Ok(())
    }

    /// 割り当て解除：武器の推定資源とアセットの割り当て数を戻す
    pub fn release_assignment(&mut self, weapon: WeaponRef, shots: u32) -> Result<()> {
        let asset = self.assets.get_mut(&weapon.asset).ok_or(IadsError::UnknownAsset(weapon.asset))?;
        let record = asset
            .weapon_mut(weapon.weapon)
            .ok_or(IadsError::UnknownWeapon { asset: weapon.asset, weapon: weapon.weapon })?;
        record.decrement_estimations(shots);
        asset.decrement_assignments();
        Ok(())
    }
}
