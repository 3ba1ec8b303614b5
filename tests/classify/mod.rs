mod categorize;
mod retryable;
