//! Module for crate-local imports to reduce boilerplate in submodules

#![allow(unused_imports)]

pub(crate) use crate::error::{CoreError, CoreResult};
pub(crate) use crate::traits::*;
pub(crate) use crate::utils;

pub(crate) use anyhow::{anyhow, bail, ensure, Context};
pub(crate) use ndarray::{array, s, Array1};
pub(crate) use serde::{Deserialize, Serialize};
