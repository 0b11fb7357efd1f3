//! Cache key families and the invalidation groups for each write path.
//!
//! Every mutating operation invalidates through one of the `*_write_keys`
//! functions below. When adding a cached read, add its key to every group
//! whose write can change the result.

/// Admin listing of all movies.
pub const MOVIES_ALL: &str = "movies:all";

/// First page of upcoming movies. Later pages are not cached.
pub const MOVIES_UPCOMING: &str = "movies:upcoming";

/// Popular movies.
pub const MOVIES_POPULAR: &str = "movies:popular";

/// Filtered movie search.
pub const MOVIES_FILTER: &str = "movies:filter";

/// Key for an upcoming-movies page, if that page is cached.
pub fn upcoming_movies(page: u32) -> Option<&'static str> {
    (page <= 1).then_some(MOVIES_UPCOMING)
}

/// Show schedule of one movie.
pub fn schedule(movie_id: i64) -> String {
    format!("schedule:{movie_id}")
}

/// Profile of one user.
pub fn user_profile(user_id: i64) -> String {
    format!("user:{user_id}:profile")
}

/// Order history of one user.
pub fn user_history(user_id: i64) -> String {
    format!("user:{user_id}:history")
}

/// Admin create, update or delete of a movie.
pub fn movie_write_keys() -> Vec<String> {
    [MOVIES_ALL, MOVIES_UPCOMING, MOVIES_POPULAR, MOVIES_FILTER]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Profile update by `user_id`.
pub fn profile_write_keys(user_id: i64) -> Vec<String> {
    vec![user_profile(user_id)]
}

/// Order placed by `user_id`.
pub fn order_write_keys(user_id: i64) -> Vec<String> {
    vec![user_history(user_id)]
}
