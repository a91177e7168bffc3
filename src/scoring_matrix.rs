//! # Scoring Matrix モジュール
//!
//! 有効なペアリングをトラックごとにまとめ、トラック優先順の順位（1始まり）を
//! 付けます。順位は初めて現れた順に払い出され、同じトラックの以後の
//! ペアリングは既存の順位に追加されます。

use std::cmp::Ordering;

use crate::error::{IadsError, Result};
use crate::models::IdRecord;
use crate::pairing::WeaponPairing;

/// 1トラック分の順位付きペアリング
#[derive(Debug, Clone)]
pub struct RankedPairings<'a> {
    pub rank: usize,
    pub track_id: IdRecord,
    pub pairings: Vec<WeaponPairing<'a>>,
}

/// 武器スコア行列
#[derive(Debug, Clone, Default)]
pub struct WeaponScoringMatrix<'a> {
    ranks: Vec<RankedPairings<'a>>,
    last_new_priority: Option<f64>,
}

impl<'a> WeaponScoringMatrix<'a> {
    pub fn new() -> Self {
        Self { ranks: Vec::new(), last_new_priority: None }
    }

    /// 優先順に並べ替えたペアリング列から行列を構築
    pub fn build(mut pairings: Vec<WeaponPairing<'a>>) -> Result<Self> {
        prioritize_pairings_globally(&mut pairings);
        let mut matrix = Self::new();
        for pairing in pairings {
            matrix.add_pairing_in_order(pairing)?;
        }
        matrix.sort_all_weapon_assessments_by_score();
        Ok(matrix)
    }

    /// トラック優先順にペアリングを追加
    ///
    /// 新しいトラックには次の順位を払い出し、既出のトラックなら既存順位に
    /// 追加します。新しいトラックの目標優先度が直前の新規トラックより
    /// 高い（値が小さい）場合は順序違反としてエラーを返します。
    ///
    /// # 戻り値
    ///
    /// ペアリングが入った順位
    pub fn add_pairing_in_order(&mut self, pairing: WeaponPairing<'a>) -> Result<usize> {
        let track_id = pairing.track_id();
        if let Some(existing) = self.ranks.iter_mut().find(|r| r.track_id == track_id) {
            existing.pairings.push(pairing);
            return Ok(existing.rank);
        }

        let priority = pairing.track().priority;
        if let Some(previous) = self.last_new_priority {
            if priority < previous {
                return Err(IadsError::PairingOutOfOrder { track: track_id, priority, previous });
            }
        }

        let rank = self.ranks.len() + 1;
        self.ranks.push(RankedPairings { rank, track_id, pairings: vec![pairing] });
        self.last_new_priority = Some(priority);
        Ok(rank)
    }

    /// 各順位内をスコア降順に安定ソート
    pub fn sort_all_weapon_assessments_by_score(&mut self) {
        for ranked in &mut self.ranks {
            ranked
                .pairings
                .sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap_or(Ordering::Equal));
        }
    }

    pub fn ranks(&self) -> &[RankedPairings<'a>] {
        &self.ranks
    }

    pub fn rank_of(&self, track_id: IdRecord) -> Option<usize> {
        self.ranks.iter().find(|r| r.track_id == track_id).map(|r| r.rank)
    }

    /// 順位の数（トラック数）
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    pub fn pairing_count(&self) -> usize {
        self.ranks.iter().map(|r| r.pairings.len()).sum()
    }
}

/// ペアリングを全体優先順に並べ替え
///
/// 目標優先度（小さいほど優先）→ 接近時間（短いほど優先）→ トラックID →
/// 武器IDの順で比較する安定ソートです。
pub fn prioritize_pairings_globally(pairings: &mut [WeaponPairing<'_>]) {
    pairings.sort_by(|a, b| {
        a.track()
            .priority
            .partial_cmp(&b.track().priority)
            .unwrap_or(Ordering::Equal)
            .then(a.closing_time().partial_cmp(&b.closing_time()).unwrap_or(Ordering::Equal))
            .then(a.track_id().cmp(&b.track_id()))
            .then(a.weapon_ref().cmp(&b.weapon_ref()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetRecord, PositionRecord, TrackRecord, Vector3, WeaponCategory, WeaponRecord};
    use crate::pairing::{ProjectionSettings, ScoreWeights};
    use crate::intercept::VclInterceptCalculator;
    use crate::weapon_table::{WeaponPreference, WeaponTableRow};

    fn asset() -> AssetRecord {
        let mut asset = AssetRecord::new(IdRecord::new(10, 0), "BTRY", PositionRecord::from_lla_deg(0.0, 0.0, 0.0));
        for (n, speed) in [(1, 300.0), (2, 600.0), (3, 900.0)] {
            let mut w = WeaponRecord::new(IdRecord::new(10, n), asset.id, WeaponCategory::Sam, 4, 2);
            w.weapon_type = "SA".into();
            w.intercept_speed_mps = speed;
            asset.add_weapon(w);
        }
        asset
    }

    fn track(number: i32, priority: f64, north_m: f64, origin: &PositionRecord) -> TrackRecord {
        let pos = PositionRecord::from_ecef(origin.ecef() + Vector3::new(0.0, 0.0, north_m));
        let mut t = TrackRecord::new(IdRecord::new(1, number), pos, Vector3::ZERO, 0.0);
        t.priority = priority;
        t
    }

    fn row() -> WeaponTableRow {
        WeaponTableRow {
            accept_any_type: true,
            accept_any_subtype: true,
            sam: vec![WeaponPreference { weapon_type: "SA".into(), priority: 1, subtypes: vec![] }],
            ..Default::default()
        }
    }

    fn scored<'a>(weapon: &'a WeaponRecord, asset: &'a AssetRecord, track: &'a TrackRecord, row: &'a WeaponTableRow) -> WeaponPairing<'a> {
        let mut p = WeaponPairing::new(weapon, asset, track, row);
        let projection = ProjectionSettings { max_projection_time_s: Some(0.0), projection_increment_s: Some(0.0), ..Default::default() };
        p.check_can_weapon_intercept(0.0, &VclInterceptCalculator::default(), None, &projection);
        p.compute_weapon_score(&ScoreWeights::default());
        p
    }

    #[test]
    fn test_rank_monotonicity_a_b_a_c() {
        let asset = asset();
        let row = row();
        let a = track(1, 1.0, 5_000.0, &asset.position);
        let b = track(2, 1.0, 6_000.0, &asset.position);
        let c = track(3, 1.0, 7_000.0, &asset.position);
        let w = asset.weapons();

        let mut matrix = WeaponScoringMatrix::new();
        assert_eq!(matrix.add_pairing_in_order(scored(&w[0], &asset, &a, &row)).unwrap(), 1);
        assert_eq!(matrix.add_pairing_in_order(scored(&w[0], &asset, &b, &row)).unwrap(), 2);
        assert_eq!(matrix.add_pairing_in_order(scored(&w[1], &asset, &a, &row)).unwrap(), 1);
        assert_eq!(matrix.add_pairing_in_order(scored(&w[0], &asset, &c, &row)).unwrap(), 3);

        assert_eq!(matrix.rank_of(a.id), Some(1));
        assert_eq!(matrix.rank_of(b.id), Some(2));
        assert_eq!(matrix.rank_of(c.id), Some(3));
        assert_eq!(matrix.ranks()[0].pairings.len(), 2);
        assert!(matrix.ranks()[0].pairings.iter().all(|p| p.track_id() == a.id));
        assert_eq!(matrix.pairing_count(), 4);
    }

    #[test]
    fn test_out_of_order_new_track_is_rejected() {
        let asset = asset();
        let row = row();
        let low = track(1, 5.0, 5_000.0, &asset.position);
        let high = track(2, 1.0, 5_000.0, &asset.position);
        let w = asset.weapons();

        let mut matrix = WeaponScoringMatrix::new();
        matrix.add_pairing_in_order(scored(&w[0], &asset, &low, &row)).unwrap();
        let err = matrix.add_pairing_in_order(scored(&w[0], &asset, &high, &row)).unwrap_err();
        assert!(matches!(err, IadsError::PairingOutOfOrder { .. }));
        assert_eq!(matrix.len(), 1);
    }

    #[test]
    fn test_build_sorts_by_priority_then_score() {
        let asset = asset();
        let row = row();
        let low = track(1, 5.0, 5_000.0, &asset.position);
        let high = track(2, 1.0, 5_000.0, &asset.position);
        let w = asset.weapons();

        let pairings = vec![
            scored(&w[0], &asset, &low, &row),
            scored(&w[0], &asset, &high, &row),
            scored(&w[2], &asset, &high, &row),
            scored(&w[1], &asset, &high, &row),
        ];
        let matrix = WeaponScoringMatrix::build(pairings).unwrap();
        assert_eq!(matrix.rank_of(high.id), Some(1));
        assert_eq!(matrix.rank_of(low.id), Some(2));

        // 高速な武器ほど迎撃時間が短くスコアが高い
        let order: Vec<IdRecord> = matrix.ranks()[0].pairings.iter().map(|p| p.weapon().id).collect();
        assert_eq!(order, vec![IdRecord::new(10, 3), IdRecord::new(10, 2), IdRecord::new(10, 1)]);
    }

    #[test]
    fn test_score_sort_is_stable() {
        let asset = asset();
        let row = row();
        let a = track(1, 1.0, 5_000.0, &asset.position);
        let w = asset.weapons();

        let mut matrix = WeaponScoringMatrix::new();
        // 失敗ペアリング（スコア0）同士は追加順を保つ
        for weapon in [&w[2], &w[0], &w[1]] {
            let mut p = WeaponPairing::new(weapon, &asset, &a, &row);
            p.set_external_fail("vetoed", true);
            matrix.add_pairing_in_order(p).unwrap();
        }
        matrix.sort_all_weapon_assessments_by_score();
        let order: Vec<i32> = matrix.ranks()[0].pairings.iter().map(|p| p.weapon().id.sub_id).collect();
        assert_eq!(order, vec![3, 1, 2]);
    }
}
