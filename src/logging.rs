use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{error, info, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    http::{Cookie, StatusClass},
    Data, Orbit, Request, Response, Rocket,
};

use crate::config::Config;
use crate::model::{
    auth::{Session, SESSION_COOKIE},
    election::{self, ElectionState},
    user::RegNum,
};
use crate::store::Storage;

/// A unique identifier for a particular request.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct RequestId(pub usize);

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl RequestId {
    /// Atomically get the next ID, wrapping to zero on overflow.
    pub fn next() -> RequestId {
        static REQUEST_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);
        RequestId(REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Who a log line is about: the session's registration number, or `-`.
struct Actor(Option<RegNum>);

impl Actor {
    fn from_cookie(cookie: Option<&Cookie<'_>>, config: Option<&Config>) -> Self {
        let reg_num = match (cookie, config) {
            (Some(cookie), Some(config)) => Session::from_cookie(cookie, config)
                .ok()
                .map(|session| session.reg_num),
            _ => None,
        };
        Self(reg_num)
    }
}

impl Display for Actor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(reg_num) => write!(f, "{reg_num}"),
            None => write!(f, "-"),
        }
    }
}

/// One-word summary of where the election is in its lifecycle.
fn phase(state: &ElectionState) -> &'static str {
    if state.is_completed {
        "completed"
    } else if state.is_active {
        "active"
    } else if state.frozen_remaining.is_some() {
        "paused"
    } else {
        "inactive"
    }
}

/// Logs every request and response, tagged with the request's ID and the
/// user whose session it carries.
#[derive(Debug, Copy, Clone)]
pub struct LoggerFairing;

#[rocket::async_trait]
impl Fairing for LoggerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Logger",
            kind: Kind::Liftoff | Kind::Request | Kind::Response | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let config = rocket.config();
        let protocol = if config.tls_enabled() { "https" } else { "http" };
        info!(
            "Voting server listening on {protocol}://{}:{}",
            config.address, config.port
        );

        if let Some(storage) = rocket.state::<Storage>() {
            match election::get_status(storage).await {
                Ok(state) => info!("Election is {}", phase(&state)),
                Err(e) => error!("Could not read the election state: {e}"),
            }
        }
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let id = req.local_cache(RequestId::next);
        let actor = Actor::from_cookie(
            req.cookies().get(SESSION_COOKIE),
            req.rocket().state::<Config>(),
        );
        info!("->req{id} [{actor}] {} {}", req.method(), req.uri());
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let id = req.local_cache(RequestId::next);
        let code = res.status();
        let route = req
            .route()
            .map(|route| match route.name {
                Some(ref name) => format!("{name} ({})", route.uri),
                None => route.uri.to_string(),
            })
            .unwrap_or_else(|| "UNKNOWN ROUTE".to_string());
        // Pending changes included, so a login or logout shows its outcome.
        let actor = Actor::from_cookie(
            req.cookies().get_pending(SESSION_COOKIE).as_ref(),
            req.rocket().state::<Config>(),
        );

        let line = format!("<-rsp{id} [{actor}] {code} {route}");
        match code.class() {
            StatusClass::ServerError => error!("{line}"),
            StatusClass::ClientError => warn!("{line}"),
            _ => info!("{line}"),
        }
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        warn!("Shutdown requested, stopping gracefully...");
    }
}
