pub mod client;
pub mod error;
pub mod projection;
pub mod settings;

pub mod proto {
    tonic::include_proto!("zbstats");
}
