//! # Munkres モジュール
//!
//! 評価行列（コスト行列）と、その最小コスト割り当てを求めるハンガリアン法
//! （Munkres法）を提供します。
//!
//! - 非正方行列は `UNASSIGNABLE_COST` で埋めて正方化します
//! - 割り当て不能なセルにも `UNASSIGNABLE_COST` を設定できます
//! - 走査は常に行優先で行うため、同じ入力には同じ解を返します
//!
//! 解いている間は番兵値を「実コストの最大値より十分大きい有限値」に置き換え、
//! 番兵同士の加減算で実コストの桁が失われないようにしています。

use tracing::error;

use crate::error::{IadsError, Result};

/// 割り当て不能を表す番兵コスト
pub const UNASSIGNABLE_COST: f64 = f32::MAX as f64;

/// 評価行列
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentMatrix {
    rows: usize,
    cols: usize,
    costs: Vec<f64>,
    assignment: Option<Vec<Option<usize>>>,
}

impl AssessmentMatrix {
    /// 全セル割り当て不能で初期化
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            costs: vec![UNASSIGNABLE_COST; rows * cols],
            assignment: None,
        }
    }

    /// 2次元配列から作成（行の長さが揃っていなければエラー）
    pub fn from_costs(costs: &[Vec<f64>]) -> Result<Self> {
        let rows = costs.len();
        let cols = costs.first().map(|r| r.len()).unwrap_or(0);
        let mut matrix = Self::new(rows, cols);
        for (row, values) in costs.iter().enumerate() {
            if values.len() != cols {
                return Err(IadsError::InvalidArgument(format!(
                    "row {} has {} columns, expected {}",
                    row,
                    values.len(),
                    cols
                )));
            }
            for (col, &value) in values.iter().enumerate() {
                matrix.set_cost(row, col, value)?;
            }
        }
        Ok(matrix)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn set_cost(&mut self, row: usize, col: usize, cost: f64) -> Result<()> {
        if row >= self.rows || col >= self.cols {
            return Err(IadsError::InvalidArgument(format!(
                "cell ({}, {}) outside {}x{} matrix",
                row, col, self.rows, self.cols
            )));
        }
        // +∞ は割り当て不可として丸め込む
        if cost.is_nan() || cost == f64::NEG_INFINITY {
            return Err(IadsError::InvalidArgument(format!("non-finite cost {} at ({}, {})", cost, row, col)));
        }
        self.costs[row * self.cols + col] = cost.min(UNASSIGNABLE_COST);
        self.assignment = None;
        Ok(())
    }

    pub fn cost(&self, row: usize, col: usize) -> Option<f64> {
        (row < self.rows && col < self.cols).then(|| self.costs[row * self.cols + col])
    }

    pub fn is_optimized(&self) -> bool {
        self.assignment.is_some()
    }

    /// 最小コスト割り当てを求める
    pub fn optimize(&mut self) {
        let size = self.rows.max(self.cols);
        if size == 0 {
            self.assignment = Some(Vec::new());
            return;
        }

        let mut square = vec![UNASSIGNABLE_COST; size * size];
        for row in 0..self.rows {
            for col in 0..self.cols {
                square[row * size + col] = self.costs[row * self.cols + col];
            }
        }
        substitute_sentinel(&mut square);

        let starred = Munkres::new(size, square).solve();
        let assignment = (0..self.rows)
            .map(|row| {
                starred[row].filter(|&col| col < self.cols && self.costs[row * self.cols + col] < UNASSIGNABLE_COST)
            })
            .collect();
        self.assignment = Some(assignment);
    }

    /// 行に割り当てられた列
    ///
    /// 割り当て不能セルや埋め草の列に落ちた行は `None` です。
    /// `optimize()` 前の呼び出しは誤用としてエラーを返します。
    pub fn assigned_column(&self, row: usize) -> Result<Option<usize>> {
        let Some(assignment) = &self.assignment else {
            error!(row, "optimize() 前に割り当て結果が参照されました");
            return Err(IadsError::MatrixNotSolved);
        };
        assignment
            .get(row)
            .copied()
            .ok_or(IadsError::RowOutOfRange { row, rows: self.rows })
    }

    /// 全ての (行, 列) 割り当て
    pub fn assignment(&self) -> Result<Vec<(usize, usize)>> {
        let Some(assignment) = &self.assignment else {
            error!("optimize() 前に割り当て結果が参照されました");
            return Err(IadsError::MatrixNotSolved);
        };
        Ok(assignment
            .iter()
            .enumerate()
            .filter_map(|(row, col)| col.map(|c| (row, c)))
            .collect())
    }

    /// 割り当てられたセルのコスト合計
    pub fn total_cost(&self) -> Result<f64> {
        Ok(self
            .assignment()?
            .into_iter()
            .map(|(row, col)| self.costs[row * self.cols + col])
            .sum())
    }
}

/// 番兵値を、実コストだけの完全割り当てより必ず悪くなる有限値に置き換える
fn substitute_sentinel(square: &mut [f64]) {
    let real: Vec<f64> = square.iter().copied().filter(|&c| c < UNASSIGNABLE_COST).collect();
    let (Some(min), Some(max)) = (
        real.iter().copied().reduce(f64::min),
        real.iter().copied().reduce(f64::max),
    ) else {
        square.iter_mut().for_each(|c| *c = 0.0);
        return;
    };
    let n = (square.len() as f64).sqrt();
    let big = max + (max - min + 1.0) * (n + 1.0);
    for cost in square.iter_mut().filter(|c| **c >= UNASSIGNABLE_COST) {
        *cost = big;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    None,
    Star,
    Prime,
}

/// Munkres法の作業領域
struct Munkres {
    n: usize,
    cost: Vec<f64>,
    marks: Vec<Mark>,
    row_covered: Vec<bool>,
    col_covered: Vec<bool>,
}

enum Step {
    CoverStarredColumns,
    PrimeUncoveredZeros,
    Augment(usize, usize),
    AdjustByMinimum,
    Done,
}

impl Munkres {
    fn new(n: usize, cost: Vec<f64>) -> Self {
        Self {
            n,
            cost,
            marks: vec![Mark::None; n * n],
            row_covered: vec![false; n],
            col_covered: vec![false; n],
        }
    }

    fn at(&self, row: usize, col: usize) -> f64 {
        self.cost[row * self.n + col]
    }

    fn mark(&self, row: usize, col: usize) -> Mark {
        self.marks[row * self.n + col]
    }

    fn set_mark(&mut self, row: usize, col: usize, mark: Mark) {
        self.marks[row * self.n + col] = mark;
    }

    /// 行ごとの星付きゼロの列
    fn solve(mut self) -> Vec<Option<usize>> {
        self.reduce_rows();
        self.star_initial_zeros();

        let mut step = Step::CoverStarredColumns;
        loop {
            step = match step {
                Step::CoverStarredColumns => self.cover_starred_columns(),
                Step::PrimeUncoveredZeros => self.prime_uncovered_zeros(),
                Step::Augment(row, col) => self.augment_path(row, col),
                Step::AdjustByMinimum => self.adjust_by_minimum(),
                Step::Done => break,
            };
        }

        (0..self.n)
            .map(|row| (0..self.n).find(|&col| self.mark(row, col) == Mark::Star))
            .collect()
    }

    // 手順1: 各行から行最小値を引く
    fn reduce_rows(&mut self) {
        for row in 0..self.n {
            let start = row * self.n;
            let min = self.cost[start..start + self.n].iter().copied().fold(f64::INFINITY, f64::min);
            for value in &mut self.cost[start..start + self.n] {
                *value -= min;
            }
        }
    }

    // 手順2: 独立なゼロに星を付ける
    fn star_initial_zeros(&mut self) {
        for row in 0..self.n {
            for col in 0..self.n {
                if self.at(row, col) == 0.0 && !self.row_covered[row] && !self.col_covered[col] {
                    self.set_mark(row, col, Mark::Star);
                    self.row_covered[row] = true;
                    self.col_covered[col] = true;
                }
            }
        }
        self.clear_covers();
    }

    // 手順3: 星付きゼロを含む列を覆う
    fn cover_starred_columns(&mut self) -> Step {
        for col in 0..self.n {
            if (0..self.n).any(|row| self.mark(row, col) == Mark::Star) {
                self.col_covered[col] = true;
            }
        }
        if self.col_covered.iter().filter(|&&c| c).count() >= self.n {
            Step::Done
        } else {
            Step::PrimeUncoveredZeros
        }
    }

    // 手順4: 覆われていないゼロにプライムを付ける
    fn prime_uncovered_zeros(&mut self) -> Step {
        loop {
            let Some((row, col)) = self.find_uncovered_zero() else {
                return Step::AdjustByMinimum;
            };
            self.set_mark(row, col, Mark::Prime);
            match (0..self.n).find(|&c| self.mark(row, c) == Mark::Star) {
                Some(star_col) => {
                    self.row_covered[row] = true;
                    self.col_covered[star_col] = false;
                }
                None => return Step::Augment(row, col),
            }
        }
    }

    fn find_uncovered_zero(&self) -> Option<(usize, usize)> {
        (0..self.n)
            .filter(|&row| !self.row_covered[row])
            .flat_map(|row| (0..self.n).map(move |col| (row, col)))
            .find(|&(row, col)| !self.col_covered[col] && self.at(row, col) == 0.0)
    }

    // 手順5: プライムと星を交互にたどる増加路で星を付け替える
    fn augment_path(&mut self, row: usize, col: usize) -> Step {
        let mut path = vec![(row, col)];
        loop {
            let (_, col) = path[path.len() - 1];
            let Some(star_row) = (0..self.n).find(|&r| self.mark(r, col) == Mark::Star) else {
                break;
            };
            path.push((star_row, col));
            let prime_col = (0..self.n).find(|&c| self.mark(star_row, c) == Mark::Prime);
            match prime_col {
                Some(prime_col) => path.push((star_row, prime_col)),
                None => break,
            }
        }

        for &(r, c) in &path {
            let flipped = if self.mark(r, c) == Mark::Star { Mark::None } else { Mark::Star };
            self.set_mark(r, c, flipped);
        }
        for mark in &mut self.marks {
            if *mark == Mark::Prime {
                *mark = Mark::None;
            }
        }
        self.clear_covers();
        Step::CoverStarredColumns
    }

    // 手順6: 覆われていない最小値で行列を調整
    fn adjust_by_minimum(&mut self) -> Step {
        let mut min = f64::INFINITY;
        for row in (0..self.n).filter(|&r| !self.row_covered[r]) {
            for col in (0..self.n).filter(|&c| !self.col_covered[c]) {
                min = min.min(self.at(row, col));
            }
        }
        for row in 0..self.n {
            for col in 0..self.n {
                let index = row * self.n + col;
                if self.row_covered[row] {
                    self.cost[index] += min;
                }
                if !self.col_covered[col] {
                    self.cost[index] -= min;
                }
            }
        }
        Step::PrimeUncoveredZeros
    }

    fn clear_covers(&mut self) {
        self.row_covered.iter_mut().for_each(|c| *c = false);
        self.col_covered.iter_mut().for_each(|c| *c = false);
    }
}
