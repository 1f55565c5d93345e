//! Pivot selection for the symmetric factorisations
use crate::blas_like::vector_max_abs;
use crate::comm::Comm;
use crate::dist_matrix::DistMatrix;
use crate::error::Result;
use crate::types::{LdlPivot, Scalar};
use cauchy::Scalar as _;

/// Make every locally held entry of `d` real and find the largest in absolute value.
fn max_real_entry<T: Scalar, C: Comm>(d: &mut DistMatrix<'_, T, C>) -> Result<LdlPivot> {
    for i_loc in 0..d.local_height() {
        d.make_local_real(i_loc, 0);
    }
    let max = vector_max_abs(d)?;
    log::trace!("Pivot {} with magnitude {:?}", max.index, max.value);
    Ok(LdlPivot {
        nb: 1,
        from: [max.index, 0],
    })
}

/// Full (diagonal) pivot of a Hermitian `[MC, MR]` matrix: the largest diagonal entry.
///
/// Collective over the grid.
pub fn full<T: Scalar, C: Comm>(a: &DistMatrix<'_, T, C>) -> Result<LdlPivot> {
    let mut d = a.get_diagonal(0)?;
    max_real_entry(&mut d)
}

/// Full pivot of the trailing matrix of a panel factorisation.
///
/// The pending update of the diagonal is `diag(X * Y^T)`, with `x` an `[MC, *]` and `y`
/// an `[MR, *]` panel aligned with `a`. Collective over the grid.
pub fn panel_full<T: Scalar, C: Comm>(
    a: &DistMatrix<'_, T, C>,
    x: &DistMatrix<'_, T, C>,
    y: &DistMatrix<'_, T, C>,
) -> Result<LdlPivot> {
    let mut d = a.get_diagonal(0)?;
    if d.participating() {
        let x_local = x.locked_matrix();
        let y_local = y.locked_matrix();
        for k_loc in 0..d.local_height() {
            let k = d.global_row(k_loc);
            let (i_x, i_y) = (x.local_row_offset(k), y.local_row_offset(k));
            let update = (0..x.width())
                .map(|l| x_local.get(i_x, l) * y_local.get(i_y, l))
                .fold(T::zero(), |acc, v| acc + v);
            let value = d.get_local(k_loc, 0);
            d.set_local(k_loc, 0, value - update);
        }
    }
    max_real_entry(&mut d)
}
