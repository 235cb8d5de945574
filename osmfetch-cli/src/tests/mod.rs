//! Shared test harness modules for the osmfetch CLI.

use super::*;

mod helpers;
