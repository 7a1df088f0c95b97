pub mod interface;
pub mod tcp;
mod tcp_cnx;
