use ndarray::{Array2, ArrayView1, Axis};

/// Outer product `a bᵀ`, shaped `(a.len(), b.len())`
pub(crate) fn outer_product(a: ArrayView1<f64>, b: ArrayView1<f64>) -> Array2<f64> {
    let column = a.insert_axis(Axis(1));
    let row = b.insert_axis(Axis(0));

    column.dot(&row)
}
