//! # Pairing モジュール
//!
//! 1組の（武器, トラック）候補について迎撃可否・予測迎撃点・スコアを求めます。
//! ペアリングは割り当てサイクルごとに作り直される一時的なレコードで、
//! サイクルをまたいで保持されることはありません。
//!
//! ## 状態遷移
//!
//! ```text
//! Unchecked ─┬─> Failed(理由)
//!            ├─> Checked { feasible: false }
//!            └─> Checked { feasible: true }  (迎撃結果あり)
//! ```
//!
//! 迎撃不能や射程外は例外ではなく、`is_failed()` と `failed_reason()` で表します。
//!
//! ## スコア
//!
//! 失敗していないペアリングのスコアは次の重み付き和です（この順で加算）。
//!
//! ```text
//! type_term     = 0 (pt == i32::MAX) / 1 / pt
//! subtype_term  = 0 (ps == i32::MAX) / 1 / ps
//! range_term    = clamp(1 - R / Rmax, 0, 1)   (Rmax が無限大・0以下なら 0)
//! time_term     = 1 / (1 + max(T, 0))
//! pk_term       = clamp(pk, 0, 1)
//! workload_term = 1 / (1 + 割当済み火器チャンネル数)
//! ```

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::models::{
    AssetRecord, IdRecord, InterceptCalculator, PositionRecord, TerrainInterface, TrackRecord, WeaponRecord, WeaponRef,
    numeric,
};
use crate::weapon_table::{UNLISTED_PRIORITY, WeaponTableRow};

pub const REASON_STALE: &str = "Weapon status is stale";
pub const REASON_TABLE_EXCLUDED: &str = "Weapon excluded by weapon table";
pub const REASON_NO_INTERCEPT: &str = "No intercept solution";
pub const REASON_MAX_RANGE: &str = "Intercept outside max range";
pub const REASON_MIN_RANGE: &str = "Intercept inside min range";
pub const REASON_LOS_MASKED: &str = "LOS masked";
pub const REASON_BELOW_TERRAIN: &str = "Intercept point below terrain";
pub const REASON_PREFERENCE: &str = "Weapon table preference not met";
pub const REASON_UNIT_EXCLUDED: &str = "Unit is excluded";

/// スコアの重み
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub weapon_type: f64,
    pub weapon_subtype: f64,
    pub intercept_range: f64,
    pub intercept_time: f64,
    pub pk: f64,
    pub workload: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            weapon_type: 1.0,
            weapon_subtype: 1.0,
            intercept_range: 1.0,
            intercept_time: 1.0,
            pk: 1.0,
            workload: 1.0,
        }
    }
}

impl ScoreWeights {
    pub fn validate(&self) -> Result<(), String> {
        let all = [
            ("weapon_type", self.weapon_type),
            ("weapon_subtype", self.weapon_subtype),
            ("intercept_range", self.intercept_range),
            ("intercept_time", self.intercept_time),
            ("pk", self.pk),
            ("workload", self.workload),
        ];
        match all.iter().find(|(_, w)| !w.is_finite() || *w < 0.0) {
            Some((name, w)) => Err(format!("score weight {} must be a non-negative number (got {})", name, w)),
            None => Ok(()),
        }
    }
}

/// トラック外挿の設定
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionSettings {
    /// 割り当て遅延・発射準備時間・実行遅延を外挿に含める
    pub use_delays: bool,
    /// 外挿の最大時間（未設定なら 距離 / 迎撃速度）
    pub max_projection_time_s: Option<f64>,
    /// 外挿の刻み（未設定なら最大時間の1/10）
    pub projection_increment_s: Option<f64>,
}

/// ペアリングの状態
#[derive(Debug, Clone, PartialEq)]
pub enum PairingState {
    Unchecked,
    Failed { reason: String },
    Checked { feasible: bool },
}

/// 迎撃評価の結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterceptResults {
    /// 現在時刻から迎撃までの時間（遅延込み, 秒）
    pub time_s: f64,
    pub point: PositionRecord,
    pub pk: f64,
    pub max_range_m: f64,
    /// 武器から迎撃点までの距離（m）
    pub intercept_range_m: f64,
    /// 現在の接近率で武器位置に到達するまでの時間（接近していなければ `f64::MAX`）
    pub closing_time_s: f64,
    /// 武器から迎撃点への初期方位（ラジアン、北基準・時計回り）
    pub bearing_rad: f64,
}

/// 地表判定の許容量（m）
const GROUND_CLEARANCE_M: f64 = 1.0;

/// 武器・トラックのペアリング
#[derive(Debug, Clone)]
pub struct WeaponPairing<'a> {
    weapon: &'a WeaponRecord,
    asset: &'a AssetRecord,
    track: &'a TrackRecord,
    row: &'a WeaponTableRow,
    state: PairingState,
    results: Option<InterceptResults>,
    priorities: (i32, i32),
    score: f64,
}

impl<'a> WeaponPairing<'a> {
    pub fn new(weapon: &'a WeaponRecord, asset: &'a AssetRecord, track: &'a TrackRecord, row: &'a WeaponTableRow) -> Self {
        Self {
            weapon,
            asset,
            track,
            row,
            state: PairingState::Unchecked,
            results: None,
            priorities: row.get_priorities(weapon),
            score: 0.0,
        }
    }

    pub fn weapon(&self) -> &'a WeaponRecord {
        self.weapon
    }

    pub fn asset(&self) -> &'a AssetRecord {
        self.asset
    }

    pub fn track(&self) -> &'a TrackRecord {
        self.track
    }

    pub fn row(&self) -> &'a WeaponTableRow {
        self.row
    }

    pub fn weapon_ref(&self) -> WeaponRef {
        self.weapon.weapon_ref()
    }

    pub fn track_id(&self) -> IdRecord {
        self.track.id
    }

    pub fn state(&self) -> &PairingState {
        &self.state
    }

    pub fn results(&self) -> Option<&InterceptResults> {
        self.results.as_ref()
    }

    /// (武器種別優先度, サブ種別優先度)
    pub fn priorities(&self) -> (i32, i32) {
        self.priorities
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, PairingState::Failed { .. } | PairingState::Checked { feasible: false })
    }

    pub fn failed_reason(&self) -> Option<&str> {
        match &self.state {
            PairingState::Failed { reason } => Some(reason),
            PairingState::Checked { feasible: false } => Some(REASON_NO_INTERCEPT),
            _ => None,
        }
    }

    /// 迎撃解を保持しているか
    pub fn can_intercept(&self) -> bool {
        self.results.is_some()
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn closing_time(&self) -> f64 {
        self.results.map(|r| r.closing_time_s).unwrap_or(f64::MAX)
    }

    fn fail(&mut self, reason: &str) {
        trace!(weapon = %self.weapon_ref(), track = %self.track.id, reason, "ペアリング失敗");
        self.state = PairingState::Failed { reason: reason.to_string() };
        self.score = 0.0;
    }

    /// 武器状況の鮮度チェック
    ///
    /// 親アセットの状況報告が `stale_time` より古ければ失敗にして `false` を返します。
    pub fn check_weapon_status_stale(&mut self, sim_time: f64, stale_time: f64) -> bool {
        if self.is_failed() {
            return false;
        }
        if self.asset.is_status_stale(sim_time, stale_time) {
            self.fail(REASON_STALE);
            return false;
        }
        true
    }

    /// 武器テーブルで優先度0（除外）になっていないか
    pub fn check_weapon_table_exclusion(&mut self) -> bool {
        if self.is_failed() {
            return false;
        }
        if self.row.is_weapon_excluded(self.weapon) {
            self.fail(REASON_TABLE_EXCLUDED);
            return false;
        }
        true
    }

    /// 迎撃可否の評価
    ///
    /// トラックを収集時刻から現在時刻（`use_delays` なら各種遅延も加算）まで外挿し、
    /// そこから刻みごとに最大外挿時間まで迎撃計算を繰り返します。
    /// 最大・最小射程と見通し線をすべて満たした最初の解を採用します。
    ///
    /// # 戻り値
    ///
    /// 迎撃可能なら `true`。不可能な場合は失敗理由を記録して `false`
    pub fn check_can_weapon_intercept(
        &mut self,
        sim_time: f64,
        calculator: &dyn InterceptCalculator,
        terrain: Option<&dyn TerrainInterface>,
        projection: &ProjectionSettings,
    ) -> bool {
        if self.is_failed() {
            return false;
        }

        let weapon_position = self.asset.position;
        let delays = if projection.use_delays {
            self.asset.assignment_delay_s + self.weapon.time_to_fire_s + self.asset.execution_delay_s
        } else {
            0.0
        };
        let lead_time = self.track.time_since_collection(sim_time) + delays;
        let (window, increment) = self.projection_window(projection, &weapon_position);

        let mut projected_time = 0.0;
        let mut last_reason: Option<&'static str> = None;
        loop {
            let projected = self.track.extrapolated(lead_time + projected_time);
            if let Some(solution) = calculator.can_intercept(&projected, self.weapon, &weapon_position) {
                let intercept_range = weapon_position.slant_range_to(&solution.point);
                let max_range = self.weapon.max_range_m.unwrap_or(f64::INFINITY).min(solution.max_range_m);

                if intercept_range > max_range {
                    last_reason = Some(REASON_MAX_RANGE);
                } else if intercept_range < self.weapon.min_range_m {
                    last_reason = Some(REASON_MIN_RANGE);
                } else if terrain.is_some_and(|t| t.is_los_masked(&weapon_position, &solution.point, false)) {
                    last_reason = Some(REASON_LOS_MASKED);
                } else if terrain
                    .is_some_and(|t| solution.point.alt_m() + GROUND_CLEARANCE_M < t.elevation(&solution.point))
                {
                    last_reason = Some(REASON_BELOW_TERRAIN);
                } else {
                    self.results = Some(InterceptResults {
                        time_s: solution.time_s + delays + projected_time,
                        point: solution.point,
                        pk: solution.pk,
                        max_range_m: max_range,
                        intercept_range_m: intercept_range,
                        closing_time_s: self.compute_closing_time(&weapon_position),
                        bearing_rad: weapon_position.bearing_to(&solution.point),
                    });
                    self.state = PairingState::Checked { feasible: true };
                    return true;
                }
            }

            if increment <= 0.0 {
                break;
            }
            projected_time += increment;
            if !numeric::less_equal(projected_time, window, numeric::DEFAULT_TOLERANCE) {
                break;
            }
        }

        match last_reason {
            Some(reason) => self.fail(reason),
            None => {
                trace!(weapon = %self.weapon_ref(), track = %self.track.id, "迎撃解なし");
                self.state = PairingState::Checked { feasible: false };
            }
        }
        false
    }

    fn projection_window(&self, projection: &ProjectionSettings, weapon_position: &PositionRecord) -> (f64, f64) {
        match (projection.max_projection_time_s, projection.projection_increment_s) {
            (Some(window), Some(increment)) => (window, increment),
            (Some(window), None) => (window, window / 10.0),
            (None, _) => {
                if self.weapon.intercept_speed_mps <= 0.0 {
                    return (0.0, 0.0);
                }
                let distance = weapon_position.great_circle_distance_to(&self.track.position);
                let window = distance / self.weapon.intercept_speed_mps;
                let increment = projection.projection_increment_s.unwrap_or(window / 10.0);
                (window, increment)
            }
        }
    }

    fn compute_closing_time(&self, weapon_position: &PositionRecord) -> f64 {
        let offset = self.track.position.ecef() - weapon_position.ecef();
        let range = offset.magnitude();
        if range <= 0.0 {
            return 0.0;
        }
        let closing_speed = -self.track.velocity.dot(&offset) / range;
        if closing_speed <= 0.0 { f64::MAX } else { range / closing_speed }
    }

    /// 迎撃結果のPKで最小PKなどの選好ゲートを確認
    pub fn check_preference_passed(&mut self) -> bool {
        if self.is_failed() {
            return false;
        }
        let pk = self.results.map(|r| r.pk);
        if !self.row.check_preference_passed(self.track, pk) {
            self.fail(REASON_PREFERENCE);
            return false;
        }
        true
    }

    /// スコアを計算して保持
    pub fn compute_weapon_score(&mut self, weights: &ScoreWeights) -> f64 {
        self.score = match (&self.state, self.results) {
            (PairingState::Checked { feasible: true }, Some(results)) => {
                let (type_priority, subtype_priority) = self.priorities;
                let type_term = inverse_priority(type_priority);
                let subtype_term = inverse_priority(subtype_priority);
                let range_term = if results.max_range_m.is_finite() && results.max_range_m > 0.0 {
                    (1.0 - results.intercept_range_m / results.max_range_m).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let time_term = 1.0 / (1.0 + results.time_s.max(0.0));
                let pk_term = results.pk.clamp(0.0, 1.0);
                let workload_term = 1.0 / (1.0 + self.weapon.estimated_allocated_fire_channels() as f64);

                weights.weapon_type * type_term
                    + weights.weapon_subtype * subtype_term
                    + weights.intercept_range * range_term
                    + weights.intercept_time * time_term
                    + weights.pk * pk_term
                    + weights.workload * workload_term
            }
            _ => 0.0,
        };
        self.score
    }

    /// 外部ルールによる拒否
    ///
    /// `reset_intercept_ability` が真なら迎撃結果も破棄します。
    pub fn set_external_fail(&mut self, reason: &str, reset_intercept_ability: bool) {
        self.fail(reason);
        if reset_intercept_ability {
            self.results = None;
        }
    }
}

fn inverse_priority(priority: i32) -> f64 {
    if priority == UNLISTED_PRIORITY || priority <= 0 { 0.0 } else { 1.0 / priority as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercept::VclInterceptCalculator;
    use crate::models::{InterceptSolution, Vector3, WeaponCategory};
    use crate::terrain::NullTerrainEngine;
    use crate::weapon_table::WeaponPreference;

    struct MaskedTerrain;

    impl TerrainInterface for MaskedTerrain {
        fn is_los_masked(&self, _from: &PositionRecord, _to: &PositionRecord, _ignore_features: bool) -> bool {
            true
        }
    }

    struct Plateau {
        elevation_m: f64,
    }

    impl TerrainInterface for Plateau {
        fn elevation(&self, _position: &PositionRecord) -> f64 {
            self.elevation_m
        }

        fn is_los_masked(&self, _from: &PositionRecord, _to: &PositionRecord, _ignore_features: bool) -> bool {
            false
        }
    }

    /// 外挿後のトラック時刻が閾値を超えた時だけ解を返す計算器
    struct LateCalculator {
        after_time: f64,
    }

    impl InterceptCalculator for LateCalculator {
        fn can_intercept(&self, track: &TrackRecord, weapon: &WeaponRecord, _pos: &PositionRecord) -> Option<InterceptSolution> {
            (track.time >= self.after_time).then(|| InterceptSolution {
                time_s: 5.0,
                point: track.position,
                pk: weapon.estimated_pk,
                max_range_m: f64::INFINITY,
            })
        }
    }

    struct Fixture {
        asset: AssetRecord,
        track: TrackRecord,
        row: WeaponTableRow,
    }

    fn fixture(range_north_m: f64) -> Fixture {
        let mut asset = AssetRecord::new(IdRecord::new(10, 0), "BTRY", PositionRecord::from_lla_deg(0.0, 0.0, 0.0));
        asset.status_time = 0.0;
        let mut weapon = WeaponRecord::new(IdRecord::new(10, 1), asset.id, WeaponCategory::Sam, 4, 2);
        weapon.weapon_type = "SA-10".into();
        weapon.intercept_speed_mps = 300.0;
        weapon.estimated_pk = 0.8;
        weapon.max_range_m = Some(40_000.0);
        weapon.min_range_m = 1_000.0;
        asset.add_weapon(weapon);

        let target = PositionRecord::from_ecef(asset.position.ecef() + Vector3::new(0.0, 0.0, range_north_m));
        let track = TrackRecord::new(IdRecord::new(1, 7), target, Vector3::ZERO, 0.0);

        let row = WeaponTableRow {
            accept_any_type: true,
            accept_any_subtype: true,
            sam: vec![WeaponPreference { weapon_type: "SA-10".into(), priority: 2, subtypes: vec![] }],
            ..Default::default()
        };
        Fixture { asset, track, row }
    }

    fn pairing(f: &Fixture) -> WeaponPairing<'_> {
        WeaponPairing::new(&f.asset.weapons()[0], &f.asset, &f.track, &f.row)
    }

    fn single_shot() -> ProjectionSettings {
        ProjectionSettings { use_delays: false, max_projection_time_s: Some(0.0), projection_increment_s: Some(0.0) }
    }

    #[test]
    fn test_feasible_pairing_populates_results() {
        let f = fixture(10_000.0);
        let mut p = pairing(&f);
        assert_eq!(p.state(), &PairingState::Unchecked);
        assert!(p.check_weapon_status_stale(10.0, 60.0));
        assert!(p.check_can_weapon_intercept(0.0, &VclInterceptCalculator::default(), Some(&NullTerrainEngine), &single_shot()));

        let results = p.results().unwrap();
        assert!((results.time_s - 33.333).abs() < 1e-2);
        assert!((results.intercept_range_m - 10_000.0).abs() < 1e-3);
        assert_eq!(results.max_range_m, 40_000.0);
        assert_eq!(results.closing_time_s, f64::MAX);
        // 目標は真北
        assert!(results.bearing_rad.abs() < 1e-9);
        assert!(!p.is_failed());
        assert_eq!(p.failed_reason(), None);
    }

    #[test]
    fn test_stale_status_fails() {
        let f = fixture(10_000.0);
        let mut p = pairing(&f);
        assert!(!p.check_weapon_status_stale(61.0, 60.0));
        assert_eq!(p.failed_reason(), Some(REASON_STALE));
        // 失敗後の評価は行わない
        assert!(!p.check_can_weapon_intercept(0.0, &VclInterceptCalculator::default(), None, &single_shot()));
        assert_eq!(p.failed_reason(), Some(REASON_STALE));
    }

    #[test]
    fn test_range_and_los_failures() {
        let far = fixture(60_000.0);
        let mut p = pairing(&far);
        assert!(!p.check_can_weapon_intercept(0.0, &VclInterceptCalculator::default(), None, &single_shot()));
        assert_eq!(p.failed_reason(), Some(REASON_MAX_RANGE));

        let near = fixture(500.0);
        let mut p = pairing(&near);
        assert!(!p.check_can_weapon_intercept(0.0, &VclInterceptCalculator::default(), None, &single_shot()));
        assert_eq!(p.failed_reason(), Some(REASON_MIN_RANGE));

        let ok = fixture(10_000.0);
        let mut p = pairing(&ok);
        assert!(!p.check_can_weapon_intercept(0.0, &VclInterceptCalculator::default(), Some(&MaskedTerrain), &single_shot()));
        assert_eq!(p.failed_reason(), Some(REASON_LOS_MASKED));
    }

    #[test]
    fn test_intercept_below_terrain_fails() {
        let f = fixture(10_000.0);
        let mut p = pairing(&f);
        let terrain = Plateau { elevation_m: 2_000.0 };
        assert!(!p.check_can_weapon_intercept(0.0, &VclInterceptCalculator::default(), Some(&terrain), &single_shot()));
        assert_eq!(p.failed_reason(), Some(REASON_BELOW_TERRAIN));

        let mut p = pairing(&f);
        let low = Plateau { elevation_m: -50.0 };
        assert!(p.check_can_weapon_intercept(0.0, &VclInterceptCalculator::default(), Some(&low), &single_shot()));
    }

    #[test]
    fn test_no_solution_is_checked_infeasible() {
        let mut f = fixture(10_000.0);
        f.track.velocity = Vector3::new(0.0, 0.0, 2_000.0);
        let mut p = pairing(&f);
        assert!(!p.check_can_weapon_intercept(0.0, &VclInterceptCalculator::default(), None, &single_shot()));
        assert_eq!(p.state(), &PairingState::Checked { feasible: false });
        assert!(p.is_failed());
        assert_eq!(p.failed_reason(), Some(REASON_NO_INTERCEPT));
    }

    #[test]
    fn test_projection_loop_finds_later_solution() {
        let f = fixture(10_000.0);
        let mut p = pairing(&f);
        let projection = ProjectionSettings {
            use_delays: false,
            max_projection_time_s: Some(30.0),
            projection_increment_s: Some(10.0),
        };
        assert!(p.check_can_weapon_intercept(0.0, &LateCalculator { after_time: 15.0 }, None, &projection));
        // 10秒刻みで20秒目に初めて成功 → 解5秒 + 外挿20秒
        assert_eq!(p.results().unwrap().time_s, 25.0);

        let mut p = pairing(&f);
        assert!(!p.check_can_weapon_intercept(0.0, &LateCalculator { after_time: 45.0 }, None, &projection));
        assert_eq!(p.failed_reason(), Some(REASON_NO_INTERCEPT));
    }

    #[test]
    fn test_delays_added_to_intercept_time() {
        let mut f = fixture(10_000.0);
        f.asset.assignment_delay_s = 2.0;
        f.asset.execution_delay_s = 1.0;
        let mut p = pairing(&f);
        let projection = ProjectionSettings { use_delays: true, ..single_shot() };
        assert!(p.check_can_weapon_intercept(0.0, &VclInterceptCalculator::default(), None, &projection));
        assert!((p.results().unwrap().time_s - (10_000.0 / 300.0 + 3.0)).abs() < 1e-2);
    }

    #[test]
    fn test_min_pk_preference() {
        let mut f = fixture(10_000.0);
        f.row.min_pk = Some(0.9);
        let mut p = pairing(&f);
        assert!(p.check_can_weapon_intercept(0.0, &VclInterceptCalculator::default(), None, &single_shot()));
        assert!(!p.check_preference_passed());
        assert_eq!(p.failed_reason(), Some(REASON_PREFERENCE));
    }

    #[test]
    fn test_table_exclusion() {
        let mut f = fixture(10_000.0);
        f.row.sam[0].priority = 0;
        let mut p = pairing(&f);
        assert!(!p.check_weapon_table_exclusion());
        assert_eq!(p.failed_reason(), Some(REASON_TABLE_EXCLUDED));
    }

    #[test]
    fn test_score_is_exact_for_fixed_inputs() {
        let f = fixture(10_000.0);
        let mut p = pairing(&f);
        assert!(p.check_can_weapon_intercept(0.0, &VclInterceptCalculator::default(), None, &single_shot()));
        let results = *p.results().unwrap();
        let score = p.compute_weapon_score(&ScoreWeights::default());

        let expected = 0.5
            + 1.0
            + (1.0 - results.intercept_range_m / 40_000.0)
            + 1.0 / (1.0 + results.time_s)
            + 0.8
            + 1.0;
        assert_eq!(score, expected);
        assert!((score - (0.5 + 1.0 + 0.75 + 1.0 / 34.333_333 + 0.8 + 1.0)).abs() < 1e-4);

        let weights = ScoreWeights { pk: 0.0, workload: 0.0, ..ScoreWeights::default() };
        assert!((p.compute_weapon_score(&weights) - (expected - 1.8)).abs() < 1e-12);
    }

    #[test]
    fn test_external_fail() {
        let f = fixture(10_000.0);
        let mut p = pairing(&f);
        assert!(p.check_can_weapon_intercept(0.0, &VclInterceptCalculator::default(), None, &single_shot()));
        p.compute_weapon_score(&ScoreWeights::default());

        p.set_external_fail(REASON_UNIT_EXCLUDED, false);
        assert!(p.is_failed());
        assert!(p.can_intercept());
        assert_eq!(p.score(), 0.0);
        assert_eq!(p.failed_reason(), Some(REASON_UNIT_EXCLUDED));

        p.set_external_fail("business rule", true);
        assert!(!p.can_intercept());
        assert_eq!(p.failed_reason(), Some("business rule"));
    }

    #[test]
    fn test_weights_validate() {
        assert!(ScoreWeights::default().validate().is_ok());
        assert!(ScoreWeights { pk: -1.0, ..Default::default() }.validate().is_err());
    }
}
