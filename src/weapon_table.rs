//! # Weapon Table モジュール
//!
//! 目標種別ごとの武器選好ルールを保持します。行は設定時の優先順に並んでおり、
//! 検索は先頭から線形に行い最初に一致した行を採用します。
//!
//! 各行は次の要素を持ちます。
//!
//! - 目標種別・サブ種別の一致条件（「任意」指定可）
//! - 速度・高度の属性ゲート（比較演算子つき）
//! - 最小PKゲート
//! - 武器区分（AI / SAM / OTHER）ごとの選好リスト（小さい値ほど優先）

use serde::{Deserialize, Serialize};

use crate::models::{TrackRecord, WeaponCategory, WeaponRecord, numeric};

/// 選好リストに無い武器の優先度（最も低い）
pub const UNLISTED_PRIORITY: i32 = i32::MAX;

/// 明示的に除外された武器の優先度
pub const EXCLUDED_PRIORITY: i32 = 0;

/// 比較演算子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "<", alias = "lt")]
    Less,
    #[serde(rename = "<=", alias = "le")]
    LessEqual,
    #[serde(rename = ">", alias = "gt")]
    Greater,
    #[serde(rename = ">=", alias = "ge")]
    GreaterEqual,
    #[serde(rename = "==", alias = "eq")]
    Equal,
}

impl Comparison {
    /// `lhs (演算子) rhs` を評価（等号は許容誤差つき）
    pub fn evaluate(&self, lhs: f64, rhs: f64) -> bool {
        let tol = numeric::DEFAULT_TOLERANCE;
        match self {
            Comparison::Less => lhs < rhs && !numeric::nearly_equal(lhs, rhs, tol),
            Comparison::LessEqual => numeric::less_equal(lhs, rhs, tol),
            Comparison::Greater => lhs > rhs && !numeric::nearly_equal(lhs, rhs, tol),
            Comparison::GreaterEqual => numeric::greater_equal(lhs, rhs, tol),
            Comparison::Equal => numeric::nearly_equal(lhs, rhs, tol),
        }
    }
}

/// ゲート対象のトラック属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackAttribute {
    /// 速度（m/s）
    Speed,
    /// 高度（m）
    Altitude,
}

/// 属性ゲート
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeGate {
    pub attribute: TrackAttribute,
    pub comparison: Comparison,
    pub value: f64,
}

impl AttributeGate {
    pub fn passes(&self, track: &TrackRecord) -> bool {
        let measured = match self.attribute {
            TrackAttribute::Speed => track.speed(),
            TrackAttribute::Altitude => track.altitude(),
        };
        self.comparison.evaluate(measured, self.value)
    }
}

/// サブ種別の選好
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtypePreference {
    pub subtype: String,
    pub priority: i32,
}

/// 武器種別の選好
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponPreference {
    #[serde(rename = "type")]
    pub weapon_type: String,
    pub priority: i32,
    /// 空ならサブ種別を問わない
    #[serde(default)]
    pub subtypes: Vec<SubtypePreference>,
}

/// 武器テーブル行
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WeaponTableRow {
    #[serde(default)]
    pub target_type: String,
    #[serde(default)]
    pub target_subtype: String,
    #[serde(default)]
    pub accept_any_type: bool,
    #[serde(default)]
    pub accept_any_subtype: bool,
    #[serde(default)]
    pub gates: Vec<AttributeGate>,
    #[serde(default)]
    pub min_pk: Option<f64>,
    #[serde(default)]
    pub ai: Vec<WeaponPreference>,
    #[serde(default)]
    pub sam: Vec<WeaponPreference>,
    #[serde(default)]
    pub other: Vec<WeaponPreference>,
}

impl WeaponTableRow {
    /// 種別・サブ種別が一致するか
    pub fn matches_types(&self, track: &TrackRecord) -> bool {
        (self.accept_any_type || self.target_type == track.target_type)
            && (self.accept_any_subtype || self.target_subtype == track.target_subtype)
    }

    /// 速度・高度ゲートをすべて満たすか
    pub fn passes_gates(&self, track: &TrackRecord) -> bool {
        self.gates.iter().all(|gate| gate.passes(track))
    }

    /// 最小PKゲート（未設定なら常に通過、PK不明なら不通過）
    pub fn passes_min_pk(&self, pk: Option<f64>) -> bool {
        match (self.min_pk, pk) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(min), Some(pk)) => numeric::greater_equal(pk, min, numeric::DEFAULT_TOLERANCE),
        }
    }

    /// 属性ゲートと最小PKゲートの総合判定
    pub fn check_preference_passed(&self, track: &TrackRecord, pk: Option<f64>) -> bool {
        self.passes_gates(track) && self.passes_min_pk(pk)
    }

    pub fn preferences(&self, category: WeaponCategory) -> &[WeaponPreference] {
        match category {
            WeaponCategory::Ai => &self.ai,
            WeaponCategory::Sam => &self.sam,
            WeaponCategory::Other => &self.other,
        }
    }

    /// (武器種別優先度, サブ種別優先度)
    ///
    /// 区分の選好リストに武器種別が無ければ両方とも `UNLISTED_PRIORITY` です。
    /// 同じ種別が複数並んでいる場合は先に書かれたものを採用します。
    /// サブ種別リストが空なら、サブ種別優先度は1（区別なし）です。
    pub fn get_priorities(&self, weapon: &WeaponRecord) -> (i32, i32) {
        let Some(entry) = self
            .preferences(weapon.category)
            .iter()
            .find(|p| p.weapon_type == weapon.weapon_type)
        else {
            return (UNLISTED_PRIORITY, UNLISTED_PRIORITY);
        };

        if entry.subtypes.is_empty() {
            return (entry.priority, 1);
        }

        let subtype_priority = entry
            .subtypes
            .iter()
            .find(|s| s.subtype == weapon.weapon_subtype)
            .map(|s| s.priority)
            .unwrap_or(UNLISTED_PRIORITY);
        (entry.priority, subtype_priority)
    }

    /// 優先度0で明示的に除外されているか
    pub fn is_weapon_excluded(&self, weapon: &WeaponRecord) -> bool {
        let (type_priority, subtype_priority) = self.get_priorities(weapon);
        type_priority == EXCLUDED_PRIORITY || subtype_priority == EXCLUDED_PRIORITY
    }

    fn negative_priority(&self) -> Option<&str> {
        [&self.ai, &self.sam, &self.other]
            .into_iter()
            .flatten()
            .find(|p| p.priority < 0 || p.subtypes.iter().any(|s| s.priority < 0))
            .map(|p| p.weapon_type.as_str())
    }
}

/// 武器テーブル
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeaponTable {
    rows: Vec<WeaponTableRow>,
}

impl WeaponTable {
    pub fn new(rows: Vec<WeaponTableRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[WeaponTableRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// トラックに一致する最初の行
    ///
    /// `match_types_only` が真なら種別の一致だけを見て、属性ゲートは評価しません。
    pub fn get_weapon_table_row(&self, track: &TrackRecord, match_types_only: bool) -> Option<&WeaponTableRow> {
        self.rows
            .iter()
            .find(|row| row.matches_types(track) && (match_types_only || row.passes_gates(track)))
    }

    pub fn check_preference_passed(&self, row: &WeaponTableRow, track: &TrackRecord, pk: Option<f64>) -> bool {
        row.check_preference_passed(track, pk)
    }

    pub fn get_priorities(&self, row: &WeaponTableRow, weapon: &WeaponRecord) -> (i32, i32) {
        row.get_priorities(weapon)
    }

    /// 設定値の検証（負の優先度・範囲外の最小PK）
    pub fn validate(&self) -> Result<(), String> {
        for (index, row) in self.rows.iter().enumerate() {
            if let Some(weapon_type) = row.negative_priority() {
                return Err(format!("weapon_table row {}: negative priority for '{}'", index, weapon_type));
            }
            if let Some(min_pk) = row.min_pk {
                if !(0.0..=1.0).contains(&min_pk) {
                    return Err(format!("weapon_table row {}: min_pk {} outside [0, 1]", index, min_pk));
                }
            }
            if !row.accept_any_type && row.target_type.is_empty() {
                return Err(format!("weapon_table row {}: target_type is empty and accept_any_type is false", index));
            }
        }
        Ok(())
    }
}
