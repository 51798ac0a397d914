//! Wire types shared between the WhatTime server and its clients.

mod api;
mod auth;
mod meeting;

pub use api::*;
pub use auth::*;
pub use meeting::*;
