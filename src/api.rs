//! One-shot request functions.
//!
//! Each function builds a fresh [`Session`] from a list of directives and runs it.
//! They are re-exported at the crate root.
//!
//! ```no_run
//! use courier::options::{Header, Timeout};
//! use std::time::Duration;
//!
//! let response = courier::get([
//!     courier::Directive::from("http://localhost:8080/status"),
//!     Header::from_iter([("Accept", "application/json")]).into(),
//!     Timeout(Duration::from_secs(2)).into(),
//! ])?;
//! assert!(response.error().is_ok());
//! # Ok::<(), courier::Error>(())
//! ```

use crate::error::Error;
use crate::multi::MultiPerform;
use crate::options::Directive;
use crate::response::Response;
use crate::scheduler::{AsyncHandle, CancellableHandle, Scheduler};
use crate::session::{Session, Verb};

fn session<I>(directives: I) -> Session
where
    I: IntoIterator,
    I::Item: Into<Directive>,
{
    let mut session = Session::new();
    session.set_all(directives);
    session
}

/// Run a batch where each item is the directive list of one request.
fn batch<I, J>(verb: Verb, requests: I) -> Result<Vec<Response>, Error>
where
    I: IntoIterator<Item = J>,
    J: IntoIterator,
    J::Item: Into<Directive>,
{
    let mut multi = MultiPerform::new();
    for directives in requests {
        multi.add_session(session(directives), verb);
    }
    multi.perform()
}

macro_rules! api {
    ($($verb:ident => $blocking:ident, $async_name:ident, $cancellable:ident, $callback:ident, $multi:ident;)*) => {
        $(
            #[doc = concat!("Perform a blocking [`Verb::", stringify!($verb), "`] request configured by `directives`.")]
            pub fn $blocking<I>(directives: I) -> Result<Response, Error>
            where
                I: IntoIterator,
                I::Item: Into<Directive>,
            {
                session(directives).execute(Verb::$verb)
            }

            #[doc = concat!("Perform a [`Verb::", stringify!($verb), "`] request on the global scheduler.")]
            pub fn $async_name<I>(directives: I) -> AsyncHandle<Result<Response, Error>>
            where
                I: IntoIterator,
                I::Item: Into<Directive>,
            {
                session(directives).spawn(Scheduler::global(), Verb::$verb)
            }

            #[doc = concat!("Perform a cancellable [`Verb::", stringify!($verb), "`] request on the global scheduler.")]
            pub fn $cancellable<I>(directives: I) -> CancellableHandle<Result<Response, Error>>
            where
                I: IntoIterator,
                I::Item: Into<Directive>,
            {
                session(directives).spawn_cancellable(Scheduler::global(), Verb::$verb)
            }

            #[doc = concat!("Perform a [`Verb::", stringify!($verb), "`] request on the global scheduler, handing the result to `callback`.")]
            pub fn $callback<F, R, I>(callback: F, directives: I) -> AsyncHandle<R>
            where
                F: FnOnce(Result<Response, Error>) -> R + Send + 'static,
                R: Clone + Send + Sync + 'static,
                I: IntoIterator,
                I::Item: Into<Directive>,
            {
                session(directives).spawn_callback(Scheduler::global(), Verb::$verb, callback)
            }

            #[doc = concat!("Perform one [`Verb::", stringify!($verb), "`] request per directive list, concurrently.")]
            pub fn $multi<I, J>(requests: I) -> Result<Vec<Response>, Error>
            where
                I: IntoIterator<Item = J>,
                J: IntoIterator,
                J::Item: Into<Directive>,
            {
                batch(Verb::$verb, requests)
            }
        )*
    };
}

api! {
    Get => get, get_async, get_cancellable, get_callback, multi_get;
    Post => post, post_async, post_cancellable, post_callback, multi_post;
    Put => put, put_async, put_cancellable, put_callback, multi_put;
    Patch => patch, patch_async, patch_cancellable, patch_callback, multi_patch;
    Delete => delete, delete_async, delete_cancellable, delete_callback, multi_delete;
    Head => head, head_async, head_cancellable, head_callback, multi_head;
    Options => options, options_async, options_cancellable, options_callback, multi_options;
    Download => download, download_async, download_cancellable, download_callback, multi_download;
}
