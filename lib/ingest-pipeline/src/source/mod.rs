//! C1: Object Source — list and fetch objects from the source bucket,
//! transparently decrypting with a customer-managed KMS key when
//! configured. See `spec.md` §4.1.

mod s3;

pub use s3::S3Source;
