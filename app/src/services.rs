//! Blocking operations against the store, shared by the HTTP resources and
//! the command line.

use anyhow::Result;

pub trait Request {
    type Resp;
}

/// Operations that only read.
pub trait Queryable<Req>
where
    Req: Request,
{
    fn query(&self, req: Req) -> Result<Req::Resp>;
}

/// Operations that change the store.
pub trait Commandable<Req>
where
    Req: Request,
{
    fn execute(&self, req: Req) -> Result<Req::Resp>;
}
