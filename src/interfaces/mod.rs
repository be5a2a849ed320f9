pub mod click;
pub mod csv;
pub mod payme;
pub mod replay;
