mod children;
mod guards;
mod lifecycle;
mod retries;
