// keyrotator-infra - command line front end for the access key rotator stack
//
// - synth: write the CloudFormation template, asset manifest and staged zips
// - check: build the stack in memory and print what it would deploy
// - init:  interactive wizard producing keyrotator.toml

pub mod check;
mod init;
mod names;
pub mod synth;
pub mod wizard;

pub use init::init_tracing;
