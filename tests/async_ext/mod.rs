mod retry;
mod timeout;
