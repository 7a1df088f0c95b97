use std::time::Duration;

use crate::errors::Result;

/// Request/response capabilities the rest of a program needs from a gateway link.
pub trait Transport {
    fn connect(&mut self) -> Result<bool>;
    fn send(&mut self, payload: &str, timeout: Duration) -> Result<()>;
    fn receive(&mut self, timeout: Duration) -> Result<String>;
    fn is_open(&self) -> bool;
    fn close(&mut self);
}

impl Transport for super::tcp::GatewayClient {
    fn connect(&mut self) -> Result<bool> {
        super::tcp::GatewayClient::connect(self)
    }

    fn send(&mut self, payload: &str, timeout: Duration) -> Result<()> {
        self.write(payload, timeout)
    }

    fn receive(&mut self, timeout: Duration) -> Result<String> {
        self.read(timeout)
    }

    fn is_open(&self) -> bool {
        super::tcp::GatewayClient::is_open(self)
    }

    fn close(&mut self) {
        super::tcp::GatewayClient::close(self)
    }
}

/// Sends one request and waits for the reply, using the same timeout for both legs.
pub fn exchange<T: Transport>(transport: &mut T, request: &str, timeout: Duration) -> Result<String> {
    transport.send(request, timeout)?;
    transport.receive(timeout)
}
