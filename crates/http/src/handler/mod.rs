//! Request handling entry point.
//!
//! A [`Handler`] is called once per successfully parsed request and fills in
//! the [`Response`]. Requests that fail to parse never reach it.

use crate::protocol::{Request, Response};

#[cfg_attr(test, mockall::automock)]
pub trait Handler {
    fn handle(&mut self, request: &Request, response: &mut Response);
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> Handler for HandlerFn<F>
where
    F: FnMut(&Request, &mut Response),
{
    fn handle(&mut self, request: &Request, response: &mut Response) {
        (self.f)(request, response)
    }
}

/// Wraps a closure into a [`Handler`].
///
/// ```
/// use webconfig_http::handler::{make_handler, Handler};
///
/// let mut hits = 0;
/// let mut handler = make_handler(move |_request, response| {
///     hits += 1;
///     response.set_body(format!("hit {hits}"));
/// });
/// # let _ = &mut handler as &mut dyn Handler;
/// ```
pub fn make_handler<F>(f: F) -> HandlerFn<F>
where
    F: FnMut(&Request, &mut Response),
{
    HandlerFn { f }
}
