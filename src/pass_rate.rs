use crate::error::{Error, Result};
use crate::gamma::GammaArray;

/// Percentage of compared points with gamma at most one.
///
/// # Errors
///
/// Returns [`Error::NoValidPoints`] when every point was excluded.
pub fn pass_rate(gamma: &GammaArray) -> Result<f64> {
    let (passed, valid) = gamma
        .valid()
        .fold((0usize, 0usize), |(passed, valid), value| {
            (passed + usize::from(value <= 1.0), valid + 1)
        });
    if valid == 0 {
        return Err(Error::NoValidPoints);
    }
    Ok(100.0 * passed as f64 / valid as f64)
}
