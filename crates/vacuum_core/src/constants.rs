//! Physical and numerical constants used by the tunneling calculations.
//!
//! None of these is configurable.

/// Reduced Planck mass, used as the highest temperature considered (GeV).
pub const MAXIMUM_ALLOWED_TEMPERATURE: f64 = 2.435e18;

/// ħ in GeV·s.
pub const HBAR_IN_GEV_SECONDS: f64 = 6.58211928e-25;

/// Age of the known Universe in seconds.
pub const AGE_OF_KNOWN_UNIVERSE_IN_SECONDS: f64 = 4.3e17;

/// Age of the known Universe in GeV⁻¹.
pub const AGE_OF_KNOWN_UNIVERSE_IN_INVERSE_GEV: f64 =
    AGE_OF_KNOWN_UNIVERSE_IN_SECONDS / HBAR_IN_GEV_SECONDS;

/// ln of the prefactor multiplying ∫ T⁻² exp(−S₃(T)/T) dT in the thermal decay exponent.
///
/// The decay width per horizon is taken as M_Planck³ T⁻² exp(−S₃(T)/T), with the
/// solitonic coefficient T⁴, g* = 105.75 held constant from T = 0 up to the dominant
/// temperature, and entropy conservation relating the horizon count today to the one
/// at T. The constant collects M_Planck · sqrt(45 / (4π³ g*)) · (g*_now / g*) ·
/// (T_now / H_now)³, which is 1.581e106 GeV = exp(244.53). The integral itself is
/// approximated by exp(−S₃(T_dom)/T_dom) / T_dom, so the survival probability
/// satisfies ln(−ln P) = 244.53 − S₃(T_dom)/T_dom − ln(T_dom / GeV).
pub const LN_OF_THERMAL_INTEGRATION_FACTOR: f64 = 244.53;

/// Added to the squared same-vacuum threshold so that it is never zero (GeV²).
pub const SAME_VACUUM_THRESHOLD_OFFSET: f64 = 1.0;

/// Factor applied to a starting point when the minimizer returned a NaN.
pub const NAN_RETRY_DAMPING: f64 = 0.8;

/// Coefficient relating T⁴ to the thermal correction at the origin:
/// roughly 100 degrees of freedom with J ≈ 2 over 2π², inverted.
pub const THERMAL_SEED_COEFFICIENT: f64 = 0.2;

/// Lifetime reported when the bounce action is too large to exponentiate (s).
pub const CAPPED_LIFETIME_IN_SECONDS: f64 = 1.0e100;

/// Lifetime reported when the bounce action is too negative to exponentiate (s).
pub const FLOORED_LIFETIME_IN_SECONDS: f64 = 0.1;

/// Saturating value for decay widths whose exponential would overflow.
pub const SATURATED_DECAY_WIDTH: f64 = 1.0e100;

/// Sentinel stored in every result field that has not been calculated.
pub const NOT_CALCULATED: f64 = -1.0;

/// Largest argument for which exp() stays below half of `f64::MAX`.
pub fn maximum_power_of_natural_exponent() -> f64 {
    (0.5 * f64::MAX).ln()
}
