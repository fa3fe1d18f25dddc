use observr_core::{Notification, Request, RequestHandler, Response, response};
use observr_macros::Request;

#[derive(Request, Clone)]
struct UserRegistered {
    name: String,
}

struct Welcome;

impl RequestHandler<UserRegistered> for Welcome {
    fn handle(&self, event: UserRegistered) -> Response<()> {
        let _ = event.name;
        response::completed()
    }
}

fn is_notification<N: Notification>() {}

fn main() {
    is_notification::<UserRegistered>();
    let _ = Welcome.handle(UserRegistered { name: "ada".into() });
}
