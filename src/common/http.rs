use std::{net::IpAddr, time::Duration};

use reqwest::{Client, Error};

const DEFAULT_USER_AGENT: &str = concat!("lavanode/", env!("CARGO_PKG_VERSION"));

pub struct HttpClient;

impl HttpClient {
  pub fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
  }

  pub fn new() -> Result<Client, Error> {
    Self::bound_to(None)
  }

  /// Builds a client whose outbound connections originate from `address`.
  pub fn bound_to(address: Option<IpAddr>) -> Result<Client, Error> {
    Client::builder()
      .user_agent(Self::default_user_agent())
      .connect_timeout(Duration::from_secs(10))
      .local_address(address)
      .build()
  }
}
