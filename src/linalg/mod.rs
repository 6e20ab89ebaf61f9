pub(crate) mod faer_ndarray;
pub mod primitives;
