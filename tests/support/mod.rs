#![allow(dead_code)]

pub mod images;
pub mod lipidmeter_env;
