use bayes_mcmc::metropolis_hastings::MetropolisHastings;
use bayes_mcmc::stats::summarize;

fn main() {
    // Unnormalized log-density of a standard normal.
    let target = |x: f64| -0.5 * x * x;

    let mut mh = MetropolisHastings::new(target, 0.0, 1.0)
        .unwrap()
        .set_seed(42);

    // 1,000 entries including the initial state; the first 100 are burn-in.
    let chain = mh.run(1000).unwrap();
    let summary = summarize(chain.view(), 100).unwrap();

    assert_eq!(summary.n_samples, 900);
    println!("x = {summary}, acceptance {:.2}", summary.acceptance_rate);
}
