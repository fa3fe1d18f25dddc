use observr_core::{Request, RequestHandler, Response, response};
use observr_macros::Request;

#[derive(Request)]
#[request(response = usize)]
struct WordCount(String);

struct Counter;

impl RequestHandler<WordCount> for Counter {
    fn handle(&self, request: WordCount) -> Response<<WordCount as Request>::Response> {
        response::ready(request.0.split_whitespace().count())
    }
}

fn main() {
    let _ = Counter.handle(WordCount("mic check one two".into()));
}
