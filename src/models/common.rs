use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use crate::geodesy;

/// ユニット・トラック識別子
///
/// `id` はユニット（またはアセット）番号、`sub_id` はトラック番号や
/// 武器番号などの下位番号です。順序は `id` → `sub_id` の辞書順です。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct IdRecord {
    pub id: i32,
    #[serde(default)]
    pub sub_id: i32,
}

impl IdRecord {
    pub const fn new(id: i32, sub_id: i32) -> Self {
        Self { id, sub_id }
    }

    /// 未設定（0:0）かどうか
    pub fn is_unset(&self) -> bool {
        self.id == 0 && self.sub_id == 0
    }
}

impl fmt::Display for IdRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.sub_id)
    }
}

/// 3次元ベクトル（ECEF座標・速度で共用）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(&self, other: &Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn magnitude_squared(&self) -> f64 {
        self.dot(self)
    }

    /// ベクトルの大きさ
    pub fn magnitude(&self) -> f64 {
        self.magnitude_squared().sqrt()
    }

    /// 単位ベクトル（ゼロベクトルはそのまま返す）
    pub fn normalize(&self) -> Self {
        let mag = self.magnitude();
        if mag > 0.0 { *self * (1.0 / mag) } else { *self }
    }

    pub fn distance_to(&self, other: &Vector3) -> f64 {
        (*self - *other).magnitude()
    }
}

impl Add for Vector3 {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl Sub for Vector3 {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Mul<f64> for Vector3 {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self::Output {
        Self::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

impl Neg for Vector3 {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// 位置レコード
///
/// 測地座標（緯度・経度はラジアン、高度はメートル）とECEF座標を
/// 常に同期した状態で保持します。どちらかを設定するともう一方が
/// 再計算されるため、片方だけが古い状態にはなりません。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionRecord {
    lat_rad: f64,
    lon_rad: f64,
    alt_m: f64,
    ecef: Vector3,
}

impl Default for PositionRecord {
    fn default() -> Self {
        Self::from_lla(0.0, 0.0, 0.0)
    }
}

impl PositionRecord {
    /// 測地座標から作成
    pub fn from_lla(lat_rad: f64, lon_rad: f64, alt_m: f64) -> Self {
        Self {
            lat_rad,
            lon_rad,
            alt_m,
            ecef: geodesy::geodetic_to_ecef(lat_rad, lon_rad, alt_m),
        }
    }

    /// 度単位の測地座標から作成
    pub fn from_lla_deg(lat_deg: f64, lon_deg: f64, alt_m: f64) -> Self {
        Self::from_lla(lat_deg.to_radians(), lon_deg.to_radians(), alt_m)
    }

    /// ECEF座標から作成
    pub fn from_ecef(ecef: Vector3) -> Self {
        let (lat_rad, lon_rad, alt_m) = geodesy::ecef_to_geodetic(&ecef);
        Self { lat_rad, lon_rad, alt_m, ecef }
    }

    pub fn set_lla(&mut self, lat_rad: f64, lon_rad: f64, alt_m: f64) {
        self.lat_rad = lat_rad;
        self.lon_rad = lon_rad;
        self.alt_m = alt_m;
        self.ecef = geodesy::geodetic_to_ecef(lat_rad, lon_rad, alt_m);
    }

    pub fn set_ecef(&mut self, ecef: Vector3) {
        let (lat, lon, alt) = geodesy::ecef_to_geodetic(&ecef);
        self.lat_rad = lat;
        self.lon_rad = lon;
        self.alt_m = alt;
        self.ecef = ecef;
    }

    pub fn lat_rad(&self) -> f64 {
        self.lat_rad
    }

    pub fn lon_rad(&self) -> f64 {
        self.lon_rad
    }

    pub fn lat_deg(&self) -> f64 {
        self.lat_rad.to_degrees()
    }

    pub fn lon_deg(&self) -> f64 {
        self.lon_rad.to_degrees()
    }

    pub fn alt_m(&self) -> f64 {
        self.alt_m
    }

    pub fn ecef(&self) -> Vector3 {
        self.ecef
    }

    /// ECEF直線距離（メートル）
    pub fn slant_range_to(&self, other: &PositionRecord) -> f64 {
        self.ecef.distance_to(&other.ecef)
    }

    /// 大圏距離（メートル）
    pub fn great_circle_distance_to(&self, other: &PositionRecord) -> f64 {
        geodesy::great_circle_distance(self.lat_rad, self.lon_rad, other.lat_rad, other.lon_rad)
    }

    /// 大圏航路の初期方位（ラジアン）
    pub fn bearing_to(&self, other: &PositionRecord) -> f64 {
        geodesy::initial_bearing(self.lat_rad, self.lon_rad, other.lat_rad, other.lon_rad)
    }

    /// ECEF速度で `dt` 秒外挿した位置
    pub fn extrapolate(&self, velocity: &Vector3, dt: f64) -> PositionRecord {
        PositionRecord::from_ecef(self.ecef + *velocity * dt)
    }
}

/// 許容誤差付き浮動小数点比較
pub mod numeric {
    /// 既定の相対許容誤差
    pub const DEFAULT_TOLERANCE: f64 = 1e-9;

    /// `a` と `b` がほぼ等しいか（相対誤差、ただし1未満の値は絶対誤差）
    pub fn nearly_equal(a: f64, b: f64, tolerance: f64) -> bool {
        let scale = 1.0_f64.max(a.abs()).max(b.abs());
        (a - b).abs() <= tolerance * scale
    }

    pub fn less_equal(a: f64, b: f64, tolerance: f64) -> bool {
        a < b || nearly_equal(a, b, tolerance)
    }

    pub fn greater_equal(a: f64, b: f64, tolerance: f64) -> bool {
        a > b || nearly_equal(a, b, tolerance)
    }
}
