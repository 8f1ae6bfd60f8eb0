// State management module.
// Paginated lists, favorites and the user list orchestrator.

pub mod favorites;
pub mod pagination;
pub mod user_list;

pub use favorites::{FavoriteUser, FavoritesStore};
pub use pagination::{FetchPage, LoadingState, Page, PaginationState, Paginator};
pub use user_list::{UserList, UserListOptions, UserListState};
