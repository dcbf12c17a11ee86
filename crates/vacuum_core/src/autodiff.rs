use num_traits::{Float, FromPrimitive, Num, NumCast, One, ToPrimitive, Zero};
use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};

/// Hyper-dual number for exact first and second derivatives.
/// re: real part
/// e1, e2: independent infinitesimal parts (e1² = e2² = 0)
/// e12: mixed part, carries ∂²f/∂x_i∂x_j when x_i is seeded in e1 and x_j in e2
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct HyperDual {
    pub re: f64,
    pub e1: f64,
    pub e2: f64,
    pub e12: f64,
}

impl HyperDual {
    pub fn new(re: f64, e1: f64, e2: f64, e12: f64) -> Self {
        Self { re, e1, e2, e12 }
    }

    pub fn constant(re: f64) -> Self {
        Self::new(re, 0.0, 0.0, 0.0)
    }

    /// Applies f with f(re) = f0, f'(re) = f1, f''(re) = f2.
    fn chain(self, f0: f64, f1: f64, f2: f64) -> Self {
        Self::new(
            f0,
            f1 * self.e1,
            f1 * self.e2,
            f1 * self.e12 + f2 * self.e1 * self.e2,
        )
    }

    fn has_infinitesimal_part(&self) -> bool {
        self.e1 != 0.0 || self.e2 != 0.0 || self.e12 != 0.0
    }
}

impl Zero for HyperDual {
    fn zero() -> Self {
        Self::constant(0.0)
    }
    fn is_zero(&self) -> bool {
        self.re == 0.0 && !self.has_infinitesimal_part()
    }
}

impl One for HyperDual {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl Add for HyperDual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.re + rhs.re,
            self.e1 + rhs.e1,
            self.e2 + rhs.e2,
            self.e12 + rhs.e12,
        )
    }
}

impl Sub for HyperDual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(
            self.re - rhs.re,
            self.e1 - rhs.e1,
            self.e2 - rhs.e2,
            self.e12 - rhs.e12,
        )
    }
}

impl Mul for HyperDual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.re * rhs.re,
            self.re * rhs.e1 + self.e1 * rhs.re,
            self.re * rhs.e2 + self.e2 * rhs.re,
            self.re * rhs.e12 + self.e1 * rhs.e2 + self.e2 * rhs.e1 + self.e12 * rhs.re,
        )
    }
}

impl Div for HyperDual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        self * rhs.recip()
    }
}

impl Neg for HyperDual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.re, -self.e1, -self.e2, -self.e12)
    }
}

impl Rem for HyperDual {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self {
        // d/dx (x mod c) = 1 away from the jumps.
        Self::new(self.re % rhs.re, self.e1, self.e2, self.e12)
    }
}

impl AddAssign for HyperDual {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
impl SubAssign for HyperDual {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}
impl MulAssign for HyperDual {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}
impl DivAssign for HyperDual {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}
impl RemAssign for HyperDual {
    fn rem_assign(&mut self, rhs: Self) {
        *self = *self % rhs;
    }
}

impl Num for HyperDual {
    type FromStrRadixErr = ();
    fn from_str_radix(str: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        f64::from_str_radix(str, radix)
            .map(Self::constant)
            .map_err(|_| ())
    }
}

impl ToPrimitive for HyperDual {
    fn to_i64(&self) -> Option<i64> {
        self.re.to_i64()
    }
    fn to_u64(&self) -> Option<u64> {
        self.re.to_u64()
    }
    fn to_f64(&self) -> Option<f64> {
        Some(self.re)
    }
}

impl FromPrimitive for HyperDual {
    fn from_i64(n: i64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_u64(n: u64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_f64(n: f64) -> Option<Self> {
        Some(Self::constant(n))
    }
}

impl NumCast for HyperDual {
    fn from<T: ToPrimitive>(n: T) -> Option<Self> {
        n.to_f64().map(Self::constant)
    }
}

impl Float for HyperDual {
    fn nan() -> Self {
        Self::constant(f64::NAN)
    }
    fn infinity() -> Self {
        Self::constant(f64::INFINITY)
    }
    fn neg_infinity() -> Self {
        Self::constant(f64::NEG_INFINITY)
    }
    fn neg_zero() -> Self {
        Self::constant(-0.0)
    }
    fn min_value() -> Self {
        Self::constant(f64::MIN)
    }
    fn min_positive_value() -> Self {
        Self::constant(f64::MIN_POSITIVE)
    }
    fn max_value() -> Self {
        Self::constant(f64::MAX)
    }
    fn is_nan(self) -> bool {
        self.re.is_nan()
    }
    fn is_infinite(self) -> bool {
        self.re.is_infinite()
    }
    fn is_finite(self) -> bool {
        self.re.is_finite()
    }
    fn is_normal(self) -> bool {
        self.re.is_normal()
    }
    fn classify(self) -> std::num::FpCategory {
        self.re.classify()
    }
    fn floor(self) -> Self {
        Self::constant(self.re.floor())
    }
    fn ceil(self) -> Self {
        Self::constant(self.re.ceil())
    }
    fn round(self) -> Self {
        Self::constant(self.re.round())
    }
    fn trunc(self) -> Self {
        Self::constant(self.re.trunc())
    }
    fn fract(self) -> Self {
        Self::new(self.re.fract(), self.e1, self.e2, self.e12)
    }
    fn abs(self) -> Self {
        if self.re >= 0.0 {
            self
        } else {
            -self
        }
    }
    fn signum(self) -> Self {
        Self::constant(self.re.signum())
    }
    fn is_sign_positive(self) -> bool {
        self.re.is_sign_positive()
    }
    fn is_sign_negative(self) -> bool {
        self.re.is_sign_negative()
    }
    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }
    fn recip(self) -> Self {
        let inv = 1.0 / self.re;
        self.chain(inv, -inv * inv, 2.0 * inv * inv * inv)
    }

    fn powi(self, n: i32) -> Self {
        let nf = n as f64;
        self.chain(
            self.re.powi(n),
            nf * self.re.powi(n - 1),
            nf * (nf - 1.0) * self.re.powi(n - 2),
        )
    }

    fn powf(self, n: Self) -> Self {
        if !n.has_infinitesimal_part() {
            // Power rule keeps negative bases with integral exponents finite.
            let p = n.re;
            let first = if p == 0.0 {
                0.0
            } else {
                p * self.re.powf(p - 1.0)
            };
            let second = if p == 0.0 || p == 1.0 {
                0.0
            } else {
                p * (p - 1.0) * self.re.powf(p - 2.0)
            };
            return self.chain(self.re.powf(p), first, second);
        }
        // x^y = exp(y * ln(x))
        (n * self.ln()).exp()
    }

    fn sqrt(self) -> Self {
        let s = self.re.sqrt();
        self.chain(s, 0.5 / s, -0.25 / (s * s * s))
    }

    fn exp(self) -> Self {
        let e = self.re.exp();
        self.chain(e, e, e)
    }

    fn exp2(self) -> Self {
        let v = self.re.exp2();
        let l = std::f64::consts::LN_2;
        self.chain(v, v * l, v * l * l)
    }
    fn ln(self) -> Self {
        let inv = 1.0 / self.re;
        self.chain(self.re.ln(), inv, -inv * inv)
    }
    fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }
    fn log2(self) -> Self {
        self.ln() / Self::constant(std::f64::consts::LN_2)
    }
    fn log10(self) -> Self {
        self.ln() / Self::constant(std::f64::consts::LN_10)
    }

    fn max(self, other: Self) -> Self {
        if self.re > other.re {
            self
        } else {
            other
        }
    }
    fn min(self, other: Self) -> Self {
        if self.re < other.re {
            self
        } else {
            other
        }
    }

    fn abs_sub(self, other: Self) -> Self {
        if self.re > other.re {
            self - other
        } else {
            Self::zero()
        }
    }

    fn cbrt(self) -> Self {
        let c = self.re.cbrt();
        self.chain(c, c / (3.0 * self.re), -2.0 * c / (9.0 * self.re * self.re))
    }
    fn hypot(self, other: Self) -> Self {
        (self * self + other * other).sqrt()
    }

    fn sin(self) -> Self {
        let (s, c) = self.re.sin_cos();
        self.chain(s, c, -s)
    }
    fn cos(self) -> Self {
        let (s, c) = self.re.sin_cos();
        self.chain(c, -s, -c)
    }
    fn tan(self) -> Self {
        let t = self.re.tan();
        let sec2 = 1.0 + t * t;
        self.chain(t, sec2, 2.0 * t * sec2)
    }
    fn asin(self) -> Self {
        let q = 1.0 - self.re * self.re;
        self.chain(self.re.asin(), q.powf(-0.5), self.re * q.powf(-1.5))
    }
    fn acos(self) -> Self {
        let q = 1.0 - self.re * self.re;
        self.chain(self.re.acos(), -q.powf(-0.5), -self.re * q.powf(-1.5))
    }
    fn atan(self) -> Self {
        let q = 1.0 + self.re * self.re;
        self.chain(self.re.atan(), 1.0 / q, -2.0 * self.re / (q * q))
    }
    fn atan2(self, other: Self) -> Self {
        let angle = self.re.atan2(other.re);
        let offset = angle - (self.re / other.re).atan();
        (self / other).atan() + Self::constant(offset)
    }
    fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }

    fn exp_m1(self) -> Self {
        let e = self.re.exp();
        self.chain(self.re.exp_m1(), e, e)
    }
    fn ln_1p(self) -> Self {
        let inv = 1.0 / (1.0 + self.re);
        self.chain(self.re.ln_1p(), inv, -inv * inv)
    }
    fn sinh(self) -> Self {
        let (s, c) = (self.re.sinh(), self.re.cosh());
        self.chain(s, c, s)
    }
    fn cosh(self) -> Self {
        let (s, c) = (self.re.sinh(), self.re.cosh());
        self.chain(c, s, c)
    }
    fn tanh(self) -> Self {
        let t = self.re.tanh();
        let sech2 = 1.0 - t * t;
        self.chain(t, sech2, -2.0 * t * sech2)
    }
    fn asinh(self) -> Self {
        let q = 1.0 + self.re * self.re;
        self.chain(self.re.asinh(), q.powf(-0.5), -self.re * q.powf(-1.5))
    }
    fn acosh(self) -> Self {
        let q = self.re * self.re - 1.0;
        self.chain(self.re.acosh(), q.powf(-0.5), -self.re * q.powf(-1.5))
    }
    fn atanh(self) -> Self {
        let q = 1.0 - self.re * self.re;
        self.chain(self.re.atanh(), 1.0 / q, 2.0 * self.re / (q * q))
    }

    fn integer_decode(self) -> (u64, i16, i8) {
        self.re.integer_decode()
    }
}

/// Seeds `point` so that evaluating f gives ∂f/∂x_i in e1, ∂f/∂x_j in e2 and
/// ∂²f/∂x_i∂x_j in e12.
pub fn seed_pair(point: &[f64], i: usize, j: usize, out: &mut [HyperDual]) {
    for (k, (slot, &value)) in out.iter_mut().zip(point).enumerate() {
        *slot = HyperDual::new(
            value,
            if k == i { 1.0 } else { 0.0 },
            if k == j { 1.0 } else { 0.0 },
            0.0,
        );
    }
}
