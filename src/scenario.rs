//! # Scenario モジュール
//!
//! YAMLシナリオファイルの読み込みと検証を行います。
//!
//! シナリオは戦闘管理（BM）の設定、武器テーブル、味方アセット、
//! 目標トラック、および下位ユニットの応答スクリプトで構成されます。
//!
//! ## 主要機能
//!
//! - **読み込み**: ファイルまたは文字列からのデシリアライズ
//! - **検証**: 時間刻み・ID重複・武器諸元・応答スクリプトの整合性確認
//! - **構築**: `AssetMap`・`TrackRecord`・`WeaponTable` の生成

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::battle_manager::BattleManagerConfig;
use crate::geodesy;
use crate::messages::{AssignmentStatus, ShotDoctrine, SystemicScope};
use crate::models::{
    AssetMap, AssetRecord, IdRecord, IffType, PositionRecord, TrackRecord, WeaponCategory, WeaponRecord,
    WeaponRef,
};
use crate::weapon_table::{WeaponTable, WeaponTableRow};

/// シナリオ読み込みエラー
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("シナリオファイルが見つかりません: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("ファイル読み込みエラー {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("YAML解析エラー: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("設定検証エラー: {0}")]
    Validation(String),
}

/// シナリオメタデータ
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScenarioMeta {
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// シミュレーション設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    pub dt_s: f64,
    pub t_max_s: f64,
    /// BMサイクル周期
    #[serde(default = "default_cycle_period")]
    pub cycle_period_s: f64,
    /// 戦闘ステータス報告周期
    #[serde(default = "default_status_period")]
    pub status_period_s: f64,
    /// 割り当て受信時にユニットが自動でWILCOを返す
    #[serde(default = "default_true")]
    pub auto_wilco: bool,
    /// 更新が途絶えたトラックをDBから削除するまでの時間
    #[serde(default = "default_track_timeout")]
    pub track_timeout_s: f64,
}

fn default_cycle_period() -> f64 {
    1.0
}

fn default_status_period() -> f64 {
    5.0
}

fn default_track_timeout() -> f64 {
    30.0
}

fn default_true() -> bool {
    true
}

/// 武器諸元
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WeaponConfig {
    pub id: IdRecord,
    #[serde(default)]
    pub name: String,
    pub category: WeaponCategory,
    #[serde(rename = "type")]
    pub weapon_type: String,
    #[serde(default)]
    pub subtype: String,
    pub munitions: u32,
    pub fire_channels: u32,
    #[serde(default)]
    pub min_range_m: f64,
    #[serde(default)]
    pub max_range_m: Option<f64>,
    #[serde(default)]
    pub time_to_fire_s: f64,
    #[serde(default)]
    pub time_between_shots_s: f64,
    pub intercept_speed_mps: f64,
    #[serde(default = "default_pk")]
    pub pk: f64,
}

fn default_pk() -> f64 {
    1.0
}

/// アセット設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetConfig {
    pub id: IdRecord,
    pub name: String,
    pub lat_deg: f64,
    pub lon_deg: f64,
    #[serde(default)]
    pub alt_m: f64,
    #[serde(default)]
    pub max_assignments: Option<u32>,
    #[serde(default)]
    pub assignment_delay_s: f64,
    #[serde(default)]
    pub execution_delay_s: f64,
    #[serde(default)]
    pub cue_sensor: Option<IdRecord>,
    #[serde(default)]
    pub weapons: Vec<WeaponConfig>,
}

/// 目標トラック設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackConfig {
    pub id: IdRecord,
    pub lat_deg: f64,
    pub lon_deg: f64,
    pub alt_m: f64,
    /// 北・東・下向きの速度（m/s）
    #[serde(default)]
    pub velocity_ned_mps: [f64; 3],
    #[serde(default)]
    pub iff: IffType,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub priority: f64,
    /// 出現時刻
    #[serde(default)]
    pub appear_time_s: f64,
    /// センサー更新が途絶える時刻
    #[serde(default)]
    pub lost_time_s: Option<f64>,
}

/// 下位ユニットの応答スクリプト
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseConfig {
    pub time_s: f64,
    pub track: IdRecord,
    pub status: AssignmentStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub scope: Option<SystemicScope>,
    #[serde(default)]
    pub weapon: Option<WeaponRef>,
    #[serde(default)]
    pub doctrine: Option<ShotDoctrine>,
}

/// シナリオ全体の設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    pub meta: ScenarioMeta,
    pub sim: SimulationConfig,
    #[serde(default)]
    pub battle_manager: BattleManagerConfig,
    #[serde(default)]
    pub weapon_table: Vec<WeaponTableRow>,
    pub assets: Vec<AssetConfig>,
    #[serde(default)]
    pub tracks: Vec<TrackConfig>,
    #[serde(default)]
    pub responses: Vec<ResponseConfig>,
}

impl ScenarioConfig {
    /// YAMLファイルからシナリオを読み込み、検証します
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// YAML文字列からシナリオを読み込み、検証します
    pub fn from_yaml_str(content: &str) -> Result<Self, ScenarioError> {
        let config: ScenarioConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 設定の妥当性を検証
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let invalid = |msg: String| -> Result<(), ScenarioError> { Err(ScenarioError::Validation(msg)) };

        if self.sim.dt_s <= 0.0 {
            return invalid("dt_s must be positive".to_string());
        }
        if self.sim.t_max_s <= 0.0 {
            return invalid("t_max_s must be positive".to_string());
        }
        if self.sim.cycle_period_s <= 0.0 || self.sim.status_period_s <= 0.0 {
            return invalid("cycle_period_s and status_period_s must be positive".to_string());
        }
        if self.sim.track_timeout_s <= 0.0 {
            return invalid("track_timeout_s must be positive".to_string());
        }

        self.battle_manager.validate().map_err(ScenarioError::Validation)?;
        self.weapon_table().validate().map_err(ScenarioError::Validation)?;

        if self.assets.is_empty() {
            return invalid("at least one asset is required".to_string());
        }
        let mut asset_ids = BTreeSet::new();
        let mut weapon_refs = BTreeSet::new();
        for asset in &self.assets {
            if asset.id.is_unset() {
                return invalid(format!("asset '{}' has an unset id", asset.name));
            }
            if !asset_ids.insert(asset.id) {
                return invalid(format!("duplicate asset id {}", asset.id));
            }
            if asset.assignment_delay_s < 0.0 || asset.execution_delay_s < 0.0 {
                return invalid(format!("asset {} has a negative delay", asset.id));
            }
            for weapon in &asset.weapons {
                if !weapon_refs.insert(WeaponRef { asset: asset.id, weapon: weapon.id }) {
                    return invalid(format!("duplicate weapon id {} on asset {}", weapon.id, asset.id));
                }
                if weapon.intercept_speed_mps <= 0.0 {
                    return invalid(format!("weapon {} intercept_speed_mps must be positive", weapon.id));
                }
                if !(0.0..=1.0).contains(&weapon.pk) {
                    return invalid(format!("weapon {} pk must be within [0, 1]", weapon.id));
                }
                if weapon.max_range_m.is_some_and(|max| max < weapon.min_range_m) {
                    return invalid(format!("weapon {} max_range_m is below min_range_m", weapon.id));
                }
            }
        }

        let mut track_ids = BTreeSet::new();
        for track in &self.tracks {
            if !track_ids.insert(track.id) {
                return invalid(format!("duplicate track id {}", track.id));
            }
            if !track.priority.is_finite() {
                return invalid(format!("track {} priority must be finite", track.id));
            }
            if track.lost_time_s.is_some_and(|lost| lost < track.appear_time_s) {
                return invalid(format!("track {} is lost before it appears", track.id));
            }
        }

        for response in &self.responses {
            if response.time_s < 0.0 {
                return invalid(format!("response for track {} has a negative time", response.track));
            }
            if !track_ids.contains(&response.track) {
                return invalid(format!("response refers to unknown track {}", response.track));
            }
            match response.status {
                AssignmentStatus::ChangedAssignedUnit => match response.weapon {
                    Some(weapon) if weapon_refs.contains(&weapon) => {}
                    Some(weapon) => return invalid(format!("response refers to unknown weapon {}", weapon)),
                    None => return invalid("Changed Assigned Unit response requires a weapon".to_string()),
                },
                AssignmentStatus::UpdatedShotDoctrine if response.doctrine.is_none() => {
                    return invalid("Updated Shot Doctrine response requires a doctrine".to_string());
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// 味方アセットの構築
    pub fn build_assets(&self) -> AssetMap {
        let mut assets = AssetMap::new();
        for config in &self.assets {
            let position = PositionRecord::from_lla_deg(config.lat_deg, config.lon_deg, config.alt_m);
            let mut asset = AssetRecord::new(config.id, config.name.clone(), position);
            if let Some(max) = config.max_assignments {
                asset.max_assignments = max;
            }
            asset.assignment_delay_s = config.assignment_delay_s;
            asset.execution_delay_s = config.execution_delay_s;
            asset.cue_sensor = config.cue_sensor;

            for w in &config.weapons {
                let mut weapon = WeaponRecord::new(w.id, config.id, w.category, w.munitions, w.fire_channels);
                weapon.name = w.name.clone();
                weapon.weapon_type = w.weapon_type.clone();
                weapon.weapon_subtype = w.subtype.clone();
                weapon.min_range_m = w.min_range_m;
                weapon.max_range_m = w.max_range_m;
                weapon.time_to_fire_s = w.time_to_fire_s;
                weapon.time_between_shots_s = w.time_between_shots_s;
                weapon.intercept_speed_mps = w.intercept_speed_mps;
                weapon.estimated_pk = w.pk;
                asset.add_weapon(weapon);
            }
            assets.insert(asset);
        }
        assets
    }

    /// 目標トラックの構築（出現時刻との組）
    pub fn build_tracks(&self) -> Vec<(f64, TrackRecord)> {
        self.tracks
            .iter()
            .map(|config| {
                let position = PositionRecord::from_lla_deg(config.lat_deg, config.lon_deg, config.alt_m);
                let [north, east, down] = config.velocity_ned_mps;
                let velocity = geodesy::ned_to_ecef_velocity(position.lat_rad(), position.lon_rad(), north, east, down);
                let mut track = TrackRecord::new(config.id, position, velocity, config.appear_time_s);
                track.iff = config.iff;
                track.target_type = config.target_type.clone();
                track.target_subtype = config.subtype.clone();
                track.priority = config.priority;
                (config.appear_time_s, track)
            })
            .collect()
    }

    pub fn weapon_table(&self) -> WeaponTable {
        WeaponTable::new(self.weapon_table.clone())
    }

    /// シナリオ概要を表示
    pub fn print_summary(&self) {
        println!("=== シナリオ概要 ===");
        println!("名前: {}", self.meta.name);
        println!("バージョン: {}", self.meta.version);
        if !self.meta.description.is_empty() {
            println!("説明: {}", self.meta.description);
        }
        println!();

        println!("シミュレーション設定:");
        println!("  時間刻み: {:.2}秒", self.sim.dt_s);
        println!("  最大時間: {:.1}秒", self.sim.t_max_s);
        println!("  BMサイクル周期: {:.2}秒", self.sim.cycle_period_s);
        println!("  ステータス報告周期: {:.2}秒", self.sim.status_period_s);
        println!("  トラック喪失判定: {:.1}秒", self.sim.track_timeout_s);
        println!();

        println!("戦闘管理:");
        println!("  BM ID: {}", self.battle_manager.id);
        println!("  割り当て方式: {:?}", self.battle_manager.allocation);
        println!("  射撃ドクトリン: {}", self.battle_manager.shot_doctrine);
        println!("  武器テーブル: {}行", self.weapon_table.len());
        println!();

        let weapon_count: usize = self.assets.iter().map(|a| a.weapons.len()).sum();
        println!("味方アセット: {}基（武器 {}基）", self.assets.len(), weapon_count);
        for asset in &self.assets {
            println!("  {} {} ({:.3}, {:.3})", asset.id, asset.name, asset.lat_deg, asset.lon_deg);
        }
        println!();

        println!("目標トラック: {}件", self.tracks.len());
        println!("応答スクリプト: {}件", self.responses.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
meta:
  version: "1.0"
  name: "単一目標"
sim:
  dt_s: 0.5
  t_max_s: 60
battle_manager:
  id: { id: 1 }
  shot_doctrine: Shoot-2
weapon_table:
  - target_type: BOMBER
    accept_any_subtype: true
    sam:
      - type: SA-10
        priority: 1
assets:
  - id: { id: 20 }
    name: BTRY-1
    lat_deg: 35.0
    lon_deg: 139.0
    max_assignments: 2
    cue_sensor: { id: 20, sub_id: 50 }
    weapons:
      - id: { id: 20, sub_id: 1 }
        category: SAM
        type: SA-10
        munitions: 8
        fire_channels: 4
        max_range_m: 150000
        intercept_speed_mps: 1200
        pk: 0.8
tracks:
  - id: { id: 900, sub_id: 1 }
    lat_deg: 35.5
    lon_deg: 139.0
    alt_m: 8000
    velocity_ned_mps: [-200, 0, 0]
    iff: hostile
    type: BOMBER
    priority: 1
responses:
  - time_s: 10
    track: { id: 900, sub_id: 1 }
    status: Kill
"#;

    #[test]
    fn test_load_from_yaml() {
        let config = ScenarioConfig::from_yaml_str(SCENARIO).unwrap();
        assert_eq!(config.meta.name, "単一目標");
        assert_eq!(config.sim.cycle_period_s, 1.0);
        assert!(config.sim.auto_wilco);
        assert_eq!(config.sim.track_timeout_s, 30.0);
        assert_eq!(config.tracks[0].lost_time_s, None);
        assert_eq!(config.battle_manager.shot_doctrine, ShotDoctrine::Shoot2);
        assert_eq!(config.responses[0].status, AssignmentStatus::Kill);

        let assets = config.build_assets();
        let asset = assets.get(IdRecord::new(20, 0)).unwrap();
        assert_eq!(asset.max_assignments, 2);
        assert_eq!(asset.cue_sensor, Some(IdRecord::new(20, 50)));
        let weapon = asset.weapon(IdRecord::new(20, 1)).unwrap();
        assert_eq!(weapon.weapon_ref().asset, IdRecord::new(20, 0));
        assert_eq!(weapon.estimated_munitions_prepped(), 8);
        assert_eq!(weapon.weapon_type, "SA-10");
    }

    #[test]
    fn test_track_velocity_points_south() {
        let config = ScenarioConfig::from_yaml_str(SCENARIO).unwrap();
        let tracks = config.build_tracks();
        let (appear, track) = &tracks[0];
        assert_eq!(*appear, 0.0);
        assert!((track.speed() - 200.0).abs() < 1e-6);

        let moved = track.extrapolated(10.0);
        assert!(moved.position.lat_deg() < track.position.lat_deg());
        assert!((moved.position.lon_deg() - 139.0).abs() < 1e-6);
    }

    #[test]
    fn test_duplicate_asset_rejected() {
        let mut config = ScenarioConfig::from_yaml_str(SCENARIO).unwrap();
        let dup = config.assets[0].clone();
        config.assets.push(dup);
        assert!(matches!(config.validate(), Err(ScenarioError::Validation(_))));
    }

    #[test]
    fn test_response_to_unknown_track_rejected() {
        let yaml = SCENARIO.replace("track: { id: 900, sub_id: 1 }\n    status", "track: { id: 901 }\n    status");
        assert!(matches!(ScenarioConfig::from_yaml_str(&yaml), Err(ScenarioError::Validation(_))));
    }

    #[test]
    fn test_changed_unit_requires_weapon() {
        let yaml = SCENARIO.replace("status: Kill", "status: Changed Assigned Unit");
        assert!(matches!(ScenarioConfig::from_yaml_str(&yaml), Err(ScenarioError::Validation(_))));
    }

    #[test]
    fn test_track_lost_before_appearing_rejected() {
        let yaml = SCENARIO.replace(
            "    type: BOMBER\n    priority: 1\n",
            "    type: BOMBER\n    priority: 1\n    appear_time_s: 10\n    lost_time_s: 5\n",
        );
        assert!(matches!(ScenarioConfig::from_yaml_str(&yaml), Err(ScenarioError::Validation(_))));
    }

    #[test]
    fn test_bad_status_is_parse_error() {
        let yaml = SCENARIO.replace("status: Kill", "status: Exploded");
        assert!(matches!(ScenarioConfig::from_yaml_str(&yaml), Err(ScenarioError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ScenarioConfig::from_file("no/such/scenario.yaml"),
            Err(ScenarioError::FileNotFound(_))
        ));
    }
}
