mod fakes;
mod live_session;
