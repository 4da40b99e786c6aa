//! Feed server API

mod client;

pub use client::{
    FeedClient, FeedPost, LoginResponse, PostKind, RegisterOutcome, UploadBody, UploadReceipt,
};
