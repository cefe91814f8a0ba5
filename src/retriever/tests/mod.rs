use super::test_helpers::*;
use super::*;
use crate::cookies::{CookieJar, HALL_TICKET_COOKIE, IMEI_TICKET_COOKIE, SESSION_COOKIE};
use crate::credentials::CredentialShape;
use crate::error::{Error, FetchError};
use crate::types::{RetrievalRange, RunStatus};

mod control;
