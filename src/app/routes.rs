use crate::{
    pipes::ViewPipe,
    routes::{Router, pipe},
};

/// The application's routes.
pub fn register(router: &mut Router) {
    router.get("/", vec![pipe(ViewPipe::new("home").with("title", "Handlr"))]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::Method;

    #[test]
    fn test_home_route() {
        let mut router = Router::new();
        register(&mut router);

        let routes = router.routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].method(), Method::GET);
        assert_eq!(routes[0].path(), "/");
        assert_eq!(routes[0].pipes()[0].name(), "ViewPipe");
    }
}
