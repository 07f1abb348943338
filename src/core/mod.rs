pub(crate) mod color;
pub(crate) mod document;
pub(crate) mod images;
pub(crate) mod ops;
pub(crate) mod pages;
pub(crate) mod stream;
pub(crate) mod walker;
