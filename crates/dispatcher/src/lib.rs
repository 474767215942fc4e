mod dispatcher;

pub use dispatcher::CrawlDispatcher;
