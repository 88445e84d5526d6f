#[macro_use]
extern crate derive_builder;

pub mod backend;

// global logger macro
extern crate log as glog;
