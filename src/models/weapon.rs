use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::models::common::IdRecord;

/// 武器システム区分（武器テーブルの優先リストを選ぶキー）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeaponCategory {
    /// 航空迎撃機
    #[serde(rename = "AI")]
    Ai,
    /// 地対空ミサイル
    #[serde(rename = "SAM")]
    Sam,
    #[serde(rename = "OTHER")]
    Other,
}

impl fmt::Display for WeaponCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WeaponCategory::Ai => "AI",
            WeaponCategory::Sam => "SAM",
            WeaponCategory::Other => "OTHER",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct WeaponRef {
    pub asset: IdRecord,
    pub weapon: IdRecord,
}

impl fmt::Display for WeaponRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.asset, self.weapon)
    }
}

/// 武器レコード
///
/// 能力値は読み取り専用のスナップショットとして扱います。推定資源カウンタは
/// 割り当ての確定・取り消しに合わせて増減し、常に
/// `0 ≤ 割当済み火器チャンネル ≤ 総火器チャンネル`、
/// `0 ≤ 準備済み弾数 ≤ 推定総弾数` を満たします。
#[derive(Debug, Clone, PartialEq)]
pub struct WeaponRecord {
    pub id: IdRecord,
    /// 所属アセット（位置・遅延の参照専用）
    pub parent: IdRecord,
    pub name: String,
    pub category: WeaponCategory,
    pub weapon_type: String,
    pub weapon_subtype: String,
    pub min_range_m: f64,
    /// 最大射程（未設定は無制限）
    pub max_range_m: Option<f64>,
    pub time_to_fire_s: f64,
    pub time_between_shots_s: f64,
    /// 平均迎撃速度（m/s）
    pub intercept_speed_mps: f64,
    pub estimated_pk: f64,
    total_fire_channels: u32,
    estimated_allocated_fire_channels: u32,
    estimated_total_munitions: u32,
    estimated_munitions_prepped: u32,
}

impl WeaponRecord {
    /// 新しい武器レコードを作成します（全弾準備済み・チャンネル未使用）
    pub fn new(id: IdRecord, parent: IdRecord, category: WeaponCategory, munitions: u32, fire_channels: u32) -> Self {
        Self {
            id,
            parent,
            name: String::new(),
            category,
            weapon_type: String::new(),
            weapon_subtype: String::new(),
            min_range_m: 0.0,
            max_range_m: None,
            time_to_fire_s: 0.0,
            time_between_shots_s: 0.0,
            intercept_speed_mps: 0.0,
            estimated_pk: 1.0,
            total_fire_channels: fire_channels,
            estimated_allocated_fire_channels: 0,
            estimated_total_munitions: munitions,
            estimated_munitions_prepped: munitions,
        }
    }

    pub fn weapon_ref(&self) -> WeaponRef {
        WeaponRef { asset: self.parent, weapon: self.id }
    }

    pub fn total_fire_channels(&self) -> u32 {
        self.total_fire_channels
    }

    pub fn estimated_allocated_fire_channels(&self) -> u32 {
        self.estimated_allocated_fire_channels
    }

    pub fn estimated_total_munitions(&self) -> u32 {
        self.estimated_total_munitions
    }

    pub fn estimated_munitions_prepped(&self) -> u32 {
        self.estimated_munitions_prepped
    }

    pub fn available_fire_channels(&self) -> u32 {
        self.total_fire_channels - self.estimated_allocated_fire_channels
    }

    /// 同時に受けられる割り当て数（空きチャンネルと準備弾数の小さい方）
    pub fn assignment_capacity(&self, shots_per_assignment: u32) -> u32 {
        let shots = shots_per_assignment.max(1);
        self.available_fire_channels().min(self.estimated_munitions_prepped / shots)
    }

    /// 割り当て確定時の推定値更新
    ///
    /// 火器チャンネルを1つ使用し、準備済み弾数を `shots` 減らします。
    /// 上下限を超える場合は飽和させて `false` を返します。
    pub fn increment_estimations(&mut self, shots: u32) -> bool {
        let mut within_bounds = true;

        if self.estimated_allocated_fire_channels < self.total_fire_channels {
            self.estimated_allocated_fire_channels += 1;
        } else {
            within_bounds = false;
        }

        if self.estimated_munitions_prepped >= shots {
            self.estimated_munitions_prepped -= shots;
        } else {
            self.estimated_munitions_prepped = 0;
            within_bounds = false;
        }

        if !within_bounds {
            warn!(weapon = %self.weapon_ref(), shots, "推定資源の増加が上限を超えたため飽和させました");
        }
        within_bounds
    }

    /// 割り当て取り消し時の推定値更新
    pub fn decrement_estimations(&mut self, shots: u32) -> bool {
        let mut within_bounds = true;

        if self.estimated_allocated_fire_channels > 0 {
            self.estimated_allocated_fire_channels -= 1;
        } else {
            within_bounds = false;
        }

        let restored = self.estimated_munitions_prepped.saturating_add(shots);
        if restored <= self.estimated_total_munitions {
            self.estimated_munitions_prepped = restored;
        } else {
            self.estimated_munitions_prepped = self.estimated_total_munitions;
            within_bounds = false;
        }

        if !within_bounds {
            warn!(weapon = %self.weapon_ref(), shots, "推定資源の減少が下限を超えたため飽和させました");
        }
        within_bounds
    }

    /// 射撃ドクトリン変更などで準備弾数だけを調整（正で消費、負で返却）
    pub fn adjust_munitions(&mut self, delta_shots: i32) {
        let current = self.estimated_munitions_prepped as i64 - delta_shots as i64;
        self.estimated_munitions_prepped = current.clamp(0, self.estimated_total_munitions as i64) as u32;
    }

    /// 状況報告による推定値の上書き（範囲外は丸め込み）
    pub fn set_reported_resources(&mut self, munitions_prepped: u32, total_munitions: u32, allocated_channels: u32, total_channels: u32) {
        self.estimated_total_munitions = total_munitions;
        self.estimated_munitions_prepped = munitions_prepped.min(total_munitions);
        self.total_fire_channels = total_channels;
        self.estimated_allocated_fire_channels = allocated_channels.min(total_channels);
    }
}
